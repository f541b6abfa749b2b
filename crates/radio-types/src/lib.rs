use serde::{Deserialize, Serialize};

/// Genre used when a directory entry carries no usable tags.
pub const DEFAULT_GENRE: &str = "Music";

/// Check whether `url` looks like a playable remote stream.
///
/// Accepts `http://`/`https://` URLs longer than 10 characters that do not point at
/// `localhost` (case-insensitive, anywhere in the URL).
pub fn is_valid_stream_url(url: &str) -> bool {
    url.len() > 10
        && (url.starts_with("http://") || url.starts_with("https://"))
        && !url.to_ascii_lowercase().contains("localhost")
}

/// A radio station as returned by the directory service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationRecord {
    pub name: String,
    pub url: String,
    pub country: String,
    #[serde(default = "default_genre")]
    pub genre: String,
    /// Nominal bitrate in kbps, `0` when unknown.
    #[serde(default)]
    pub bitrate: u32,
}

fn default_genre() -> String {
    DEFAULT_GENRE.to_string()
}

impl StationRecord {
    /// Build a record, filling in the default genre when `genre` is blank.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        country: impl Into<String>,
        genre: impl Into<String>,
        bitrate: u32,
    ) -> Self {
        let genre = genre.into();
        Self {
            name: name.into(),
            url: url.into(),
            country: country.into(),
            genre: if genre.trim().is_empty() {
                default_genre()
            } else {
                genre
            },
            bitrate,
        }
    }

    pub fn has_valid_url(&self) -> bool {
        is_valid_stream_url(&self.url)
    }

    /// One-line summary: `country | genre | 128k`.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.country.as_str(), self.genre.as_str()];
        let bitrate = format!("{}k", self.bitrate);
        if self.bitrate > 0 {
            parts.push(&bitrate);
        }
        parts.join(" | ")
    }
}

/// Lifecycle state of a playback session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No session has been started yet.
    #[default]
    Idle,
    /// Fallback protocol in progress.
    Starting,
    Playing,
    /// The sink went quiet; a restart is being issued.
    Stalled,
    Stopping,
    Stopped,
    Failed,
}

impl PlaybackState {
    /// Stopped and Failed sessions never leave their state.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Stopped | PlaybackState::Failed)
    }
}

/// Which fallback strategy produced audio for a session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStrategy {
    #[default]
    None,
    /// The sink plays the remote URL itself.
    Direct,
    /// A prefix is spooled to a temp file which keeps growing in the background.
    ProgressiveDownload,
}

/// Point-in-time view of the playback engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
    /// Monotonic id of the current (or last) session, `0` before the first play.
    pub session_id: u64,
    /// Stream URL of the current session.
    pub url: Option<String>,
    pub state: PlaybackState,
    pub strategy: PlaybackStrategy,
    /// Last volume set by the user (0..=100).
    pub volume: u8,
    /// Number of stall restarts in the current session.
    pub restarts: u32,
    /// `false` when the engine runs without an audio device.
    pub audio_capable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_validation_rejects_bad_inputs() {
        assert!(!is_valid_stream_url(""));
        assert!(!is_valid_stream_url("http://a.b"));
        assert!(!is_valid_stream_url("ftp://radio.example.com/live"));
        assert!(!is_valid_stream_url("radio.example.com/live.mp3"));
        assert!(!is_valid_stream_url("http://localhost:8000/live"));
        assert!(!is_valid_stream_url("http://LOCALHOST:8000/live"));
    }

    #[test]
    fn stream_url_validation_accepts_remote_streams() {
        assert!(is_valid_stream_url("http://a.example"));
        assert!(is_valid_stream_url("https://stream.example.org/live.mp3"));
    }

    #[test]
    fn station_record_defaults_blank_genre() {
        let station = StationRecord::new("Jazz FM", "https://jazz.example/live", "UK", "  ", 0);
        assert_eq!(station.genre, DEFAULT_GENRE);
        assert!(station.has_valid_url());
    }

    #[test]
    fn station_record_deserializes_missing_optional_fields() {
        let station: StationRecord = serde_json::from_str(
            r#"{"name":"A","url":"https://a.example/live","country":"FR"}"#,
        )
        .expect("decode station");
        assert_eq!(station.genre, "Music");
        assert_eq!(station.bitrate, 0);
    }

    #[test]
    fn summary_omits_unknown_bitrate() {
        let mut station = StationRecord::new("A", "https://a.example/live", "FR", "Jazz", 0);
        assert_eq!(station.summary(), "FR | Jazz");
        station.bitrate = 128;
        assert_eq!(station.summary(), "FR | Jazz | 128k");
    }

    #[test]
    fn terminal_states() {
        assert!(PlaybackState::Stopped.is_terminal());
        assert!(PlaybackState::Failed.is_terminal());
        assert!(!PlaybackState::Stalled.is_terminal());
    }

    #[test]
    fn engine_status_serializes_snake_case_states() {
        let status = EngineStatus {
            state: PlaybackState::Playing,
            strategy: PlaybackStrategy::ProgressiveDownload,
            ..EngineStatus::default()
        };
        let json = serde_json::to_string(&status).expect("encode status");
        assert!(json.contains("\"playing\""));
        assert!(json.contains("\"progressive_download\""));
    }
}
