//! The audio output seam used by the playback engine.

use std::fmt;
use std::path::PathBuf;

use crate::error::SinkError;

/// What the sink should play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkSource {
    /// A remote stream the sink opens itself.
    Url(String),
    /// A local file, possibly still growing.
    File(PathBuf),
}

impl fmt::Display for SinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkSource::Url(url) => f.write_str(url),
            SinkSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Audio output device abstraction.
///
/// Implementations are shared between the engine and its worker threads, so all
/// methods take `&self`. `stop` and `set_volume` must never block on decoding or
/// network work.
pub trait AudioSink: Send + Sync {
    /// Prepare `source` for playback, replacing whatever was loaded before.
    fn load(&self, source: &SinkSource) -> Result<(), SinkError>;
    /// Start output of the loaded source; restart at its beginning on EOF when
    /// `loop_forever` is set.
    fn play(&self, loop_forever: bool) -> Result<(), SinkError>;
    fn stop(&self);
    /// Linear gain in `0.0..=1.0`.
    fn set_volume(&self, level: f32);
    /// `true` while output is being produced.
    fn is_busy(&self) -> bool;
}

/// Sink for hosts without audio output. Accepts everything, plays nothing.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn load(&self, source: &SinkSource) -> Result<(), SinkError> {
        tracing::debug!(source = %source, "null sink load");
        Ok(())
    }

    fn play(&self, _loop_forever: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn stop(&self) {}

    fn set_volume(&self, _level: f32) {}

    fn is_busy(&self) -> bool {
        true
    }
}
