//! Streaming playback engine for internet radio.
//!
//! [`PlaybackEngine`] turns a stream URL into continuous audio. It first lets the
//! [`AudioSink`] open the URL itself; if the sink refuses, it spools the stream
//! into a temp file, starts playback once enough is buffered and keeps appending
//! in the background. A liveness loop restarts the sink whenever it goes quiet.

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod output;
pub mod sink;
pub mod spool;

mod engine;
mod liveness;
mod session;
mod strategy;

pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use error::{AttemptError, FetchError, SinkError};
pub use events::EngineEvent;
pub use fetch::{HttpFetcher, StreamFetcher};
pub use session::CancelToken;
pub use sink::{AudioSink, NullSink, SinkSource};
pub use spool::{SPOOL_PREFIX, cleanup_temp_files};
