use std::path::PathBuf;
use std::time::Duration;

/// Tuning parameters for the playback engine and its fallback strategies.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Size of one download chunk in bytes.
    pub chunk_bytes: usize,
    /// Chunks written to the spool file before playback starts (~256 KiB by default).
    pub priming_chunks: usize,
    /// Spool files smaller than this are treated as an error body, not audio.
    pub min_playable_bytes: u64,
    /// Liveness loop tick.
    pub poll_interval: Duration,
    /// Connect/response timeout for the progressive download request.
    pub http_timeout: Duration,
    /// Directory that receives spool files.
    pub temp_dir: PathBuf,
    /// Volume (0..=100) applied before the user touches the slider.
    pub initial_volume: u8,
    /// Result of the startup audio capability check. When `false` the engine
    /// reports playback without producing any audio.
    pub audio_capable: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 8 * 1024,
            priming_chunks: 32,
            min_playable_bytes: 1024,
            poll_interval: Duration::from_secs(1),
            http_timeout: Duration::from_secs(15),
            temp_dir: std::env::temp_dir(),
            initial_volume: 75,
            audio_capable: true,
        }
    }
}

impl EngineConfig {
    /// Bytes that the priming step aims to buffer before playback starts.
    pub fn priming_bytes(&self) -> usize {
        self.chunk_bytes.saturating_mul(self.priming_chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.chunk_bytes, 8192);
        assert_eq!(cfg.priming_chunks, 32);
        assert_eq!(cfg.priming_bytes(), 256 * 1024);
        assert_eq!(cfg.min_playable_bytes, 1024);
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.initial_volume, 75);
        assert!(cfg.audio_capable);
    }
}
