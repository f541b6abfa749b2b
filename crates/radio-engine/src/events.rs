use radio_types::PlaybackStrategy;

/// Asynchronous notifications from the engine's background work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    PlaybackStarted {
        session: u64,
        url: String,
        strategy: PlaybackStrategy,
    },
    /// Both strategies failed; the session is terminal.
    PlaybackFailed {
        session: u64,
        url: String,
        reason: String,
    },
    /// The sink went quiet and was restarted. `restarts` counts all restarts of the
    /// session so far.
    StallRecovered { session: u64, restarts: u32 },
    PlaybackStopped { session: u64 },
}

impl EngineEvent {
    pub fn session(&self) -> u64 {
        match self {
            EngineEvent::PlaybackStarted { session, .. }
            | EngineEvent::PlaybackFailed { session, .. }
            | EngineEvent::StallRecovered { session, .. }
            | EngineEvent::PlaybackStopped { session } => *session,
        }
    }
}
