//! The streaming playback engine.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use radio_types::{EngineStatus, PlaybackState, PlaybackStrategy, is_valid_stream_url};

use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::fetch::{HttpFetcher, StreamFetcher};
use crate::session::Session;
use crate::sink::AudioSink;
use crate::strategy;

/// Capacity of the event queue; events emitted while it is full are dropped.
const EVENT_CAPACITY: usize = 64;

/// Engine-wide context shared with session workers.
pub(crate) struct Shared {
    pub(crate) sink: Arc<dyn AudioSink>,
    pub(crate) fetcher: Arc<dyn StreamFetcher>,
    pub(crate) config: EngineConfig,
    volume: AtomicU8,
    /// Held by a worker across "load, then start output" so two sessions never
    /// interleave their sink calls. `stop()` never takes it.
    sink_lock: Mutex<()>,
    /// Serializes "check cancel, then start output" against `stop()`. Always
    /// taken after `sink_lock`.
    gate: Mutex<()>,
    events: Sender<EngineEvent>,
}

impl Shared {
    pub(crate) fn lock_sink(&self) -> MutexGuard<'_, ()> {
        self.sink_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub(crate) fn volume_level(&self) -> f32 {
        f32::from(self.volume()) / 100.0
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(session = event.session(), ?event, "event queue full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[derive(Default)]
struct Current {
    next_id: u64,
    session: Option<Arc<Session>>,
}

/// Plays one internet radio stream at a time.
///
/// All methods return quickly; the fallback protocol, the download continuation
/// and stall recovery run on background threads. Outcomes are reported through
/// [`PlaybackEngine::events`].
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    current: Mutex<Current>,
    events: Receiver<EngineEvent>,
}

impl PlaybackEngine {
    /// Engine that fetches progressive downloads over HTTP.
    pub fn new(sink: Arc<dyn AudioSink>, config: EngineConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.http_timeout));
        Self::with_fetcher(sink, fetcher, config)
    }

    pub fn with_fetcher(
        sink: Arc<dyn AudioSink>,
        fetcher: Arc<dyn StreamFetcher>,
        config: EngineConfig,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        let volume = config.initial_volume.min(100);
        Self {
            shared: Arc::new(Shared {
                sink,
                fetcher,
                config,
                volume: AtomicU8::new(volume),
                sink_lock: Mutex::new(()),
                gate: Mutex::new(()),
                events: tx,
            }),
            current: Mutex::new(Current::default()),
            events: rx,
        }
    }

    fn current(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver of engine notifications. Every clone competes for the same events.
    ///
    /// At most 64 undelivered events are queued; later ones are dropped until a
    /// receiver catches up.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events.clone()
    }

    /// Start playing `url`, replacing the current session.
    ///
    /// Returns `false` without touching the current session when the URL is not a
    /// playable remote stream, or when the session worker could not be started.
    pub fn play(&self, url: &str) -> bool {
        if !is_valid_stream_url(url) {
            tracing::info!(url, "rejecting invalid stream url");
            return false;
        }

        let mut current = self.current();
        if let Some(session) = current.session.clone() {
            self.stop_session(&session);
        }

        current.next_id += 1;
        let session = Arc::new(Session::new(current.next_id, url.to_string()));
        current.session = Some(Arc::clone(&session));

        if !self.shared.config.audio_capable {
            session.mark_playing(PlaybackStrategy::None, None);
            tracing::info!(session = session.id, url, "no audio output, playback is silent");
            self.shared.emit(EngineEvent::PlaybackStarted {
                session: session.id,
                url: url.to_string(),
                strategy: PlaybackStrategy::None,
            });
            return true;
        }

        let shared = Arc::clone(&self.shared);
        let worker_session = Arc::clone(&session);
        let spawned = std::thread::Builder::new()
            .name(format!("radio-session-{}", session.id))
            .spawn(move || strategy::run_session(shared, worker_session));
        match spawned {
            Ok(_) => {
                tracing::debug!(session = session.id, url, "session scheduled");
                true
            }
            Err(e) => {
                tracing::error!(session = session.id, error = %e, "failed to spawn session worker");
                if session.transition(PlaybackState::Failed) {
                    self.shared.emit(EngineEvent::PlaybackFailed {
                        session: session.id,
                        url: url.to_string(),
                        reason: format!("spawn session worker: {e}"),
                    });
                }
                false
            }
        }
    }

    /// Stop the current session. Does nothing when idle or already stopped.
    pub fn stop(&self) {
        let current = self.current();
        if let Some(session) = current.session.clone() {
            self.stop_session(&session);
        }
    }

    fn stop_session(&self, session: &Session) {
        {
            let _gate = self.shared.lock_gate();
            session.cancel.cancel();
            if !session.transition(PlaybackState::Stopping) {
                return;
            }
            if self.shared.config.audio_capable {
                self.shared.sink.stop();
            }
        }
        session.release_spool();
        session.transition(PlaybackState::Stopped);
        tracing::info!(session = session.id, "playback stopped");
        self.shared.emit(EngineEvent::PlaybackStopped {
            session: session.id,
        });
    }

    /// Set the output volume, clamped to `0..=100`. Takes effect at once while
    /// playing and is reapplied on every (re)start.
    pub fn set_volume(&self, level: i32) {
        let level = level.clamp(0, 100) as u8;
        self.shared.volume.store(level, Ordering::Relaxed);
        let playing = self
            .current()
            .session
            .as_ref()
            .is_some_and(|s| s.state() == PlaybackState::Playing);
        if playing && self.shared.config.audio_capable {
            self.shared.sink.set_volume(self.shared.volume_level());
        }
    }

    pub fn volume(&self) -> u8 {
        self.shared.volume()
    }

    pub fn status(&self) -> EngineStatus {
        let current = self.current();
        let mut status = EngineStatus {
            volume: self.shared.volume(),
            audio_capable: self.shared.config.audio_capable,
            ..EngineStatus::default()
        };
        if let Some(session) = &current.session {
            status.session_id = session.id;
            status.url = Some(session.url.clone());
            status.state = session.state();
            status.strategy = session.strategy();
            status.restarts = session.restarts();
        }
        status
    }

    /// Path of the current session's spool file, if it has one.
    pub fn spool_path(&self) -> Option<std::path::PathBuf> {
        self.current().session.as_ref().and_then(|s| s.spool_path())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
