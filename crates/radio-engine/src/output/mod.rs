//! Real audio output: Symphonia decode, optional Rubato resample, CPAL playback.
//!
//! [`CpalSink`] implements [`AudioSink`]. Each `play` spawns one output thread
//! that owns the (non-`Send`) CPAL stream and keeps decoding its source until
//! stopped. With `loop_forever` the source is reopened from the start whenever
//! it runs dry, which for a growing spool file or a remote stream means picking
//! up wherever the data now ends.

pub mod decode;
pub mod device;
pub mod queue;
pub mod resample;
pub mod source;
pub mod stream;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;

use crate::error::SinkError;
use crate::fetch::{HttpFetcher, StreamFetcher};
use crate::sink::{AudioSink, SinkSource};

/// Tuning for the decode/resample/output pipeline.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Resampler input chunk in frames.
    pub chunk_frames: usize,
    /// Frames the audio callback takes from the queue per refill.
    pub refill_max_frames: usize,
    /// Target buffering of each pipeline queue.
    pub buffer_seconds: f32,
    /// How long a read at the end of a spool file waits for more data.
    pub growth_wait: Duration,
    /// Timeout for opening remote streams directly.
    pub http_timeout: Duration,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            growth_wait: Duration::from_secs(10),
            http_timeout: Duration::from_secs(15),
        }
    }
}

struct Run {
    cancel: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

/// [`AudioSink`] playing through a CPAL output device.
pub struct CpalSink {
    device: Option<String>,
    config: OutputConfig,
    fetcher: Arc<dyn StreamFetcher>,
    gain: stream::Gain,
    loaded: Mutex<Option<SinkSource>>,
    run: Mutex<Option<Run>>,
}

impl CpalSink {
    /// Sink on the output device whose name contains `device`, or the default one.
    pub fn new(device: Option<String>, config: OutputConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.http_timeout));
        Self {
            device,
            config,
            fetcher,
            gain: stream::Gain::new(1.0),
            loaded: Mutex::new(None),
            run: Mutex::new(None),
        }
    }

    fn loaded(&self) -> MutexGuard<'_, Option<SinkSource>> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioSink for CpalSink {
    fn load(&self, source: &SinkSource) -> Result<(), SinkError> {
        // Probe once so unplayable sources are rejected here rather than later
        // inside the output thread.
        let cancel = Arc::new(AtomicBool::new(false));
        let (media, hint) = source::open_media_source(
            source,
            self.fetcher.as_ref(),
            self.config.growth_wait,
            cancel.clone(),
        )
        .map_err(|e| SinkError::Rejected(format!("{e:#}")))?;
        let probed = decode::probe(media, &hint).map_err(|e| SinkError::Rejected(format!("{e:#}")))?;
        cancel.store(true, Ordering::Relaxed);
        tracing::debug!(
            source = %source,
            codec = probed.codec_name().unwrap_or("unknown"),
            rate_hz = probed.rate,
            channels = probed.channels,
            "source accepted"
        );
        *self.loaded() = Some(source.clone());
        Ok(())
    }

    fn play(&self, loop_forever: bool) -> Result<(), SinkError> {
        let source = self.loaded().clone().ok_or(SinkError::NothingLoaded)?;
        let mut run = self.run();
        if let Some(previous) = run.take() {
            previous.cancel.store(true, Ordering::Relaxed);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let ctx = OutputRun {
            source,
            device: self.device.clone(),
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            gain: self.gain.clone(),
            cancel: cancel.clone(),
        };
        let done = finished.clone();
        std::thread::Builder::new()
            .name("radio-output".into())
            .spawn(move || {
                ctx.run(loop_forever);
                done.store(true, Ordering::Relaxed);
            })
            .map_err(|e| SinkError::Unavailable(format!("spawn output thread: {e}")))?;
        *run = Some(Run { cancel, finished });
        Ok(())
    }

    fn stop(&self) {
        if let Some(run) = self.run().take() {
            run.cancel.store(true, Ordering::Relaxed);
        }
    }

    fn set_volume(&self, level: f32) {
        self.gain.set(level);
    }

    fn is_busy(&self) -> bool {
        self.run()
            .as_ref()
            .is_some_and(|run| !run.finished.load(Ordering::Relaxed))
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one output thread needs.
struct OutputRun {
    source: SinkSource,
    device: Option<String>,
    config: OutputConfig,
    fetcher: Arc<dyn StreamFetcher>,
    gain: stream::Gain,
    cancel: Arc<AtomicBool>,
}

impl OutputRun {
    fn run(&self, loop_forever: bool) {
        loop {
            match self.play_once() {
                Ok(()) => tracing::debug!(source = %self.source, "source drained"),
                Err(e) => {
                    tracing::warn!(source = %self.source, error = %format!("{e:#}"), "output failed");
                    break;
                }
            }
            if !loop_forever || self.cancel.load(Ordering::Relaxed) {
                break;
            }
        }
    }

    /// Play the source once, until it is drained or the run is cancelled.
    fn play_once(&self) -> Result<()> {
        let (media, hint) = source::open_media_source(
            &self.source,
            self.fetcher.as_ref(),
            self.config.growth_wait,
            self.cancel.clone(),
        )?;
        let probed = decode::probe(media, &hint)?;
        let src_rate = probed.rate;
        let srcq = decode::start_decode(probed, self.config.buffer_seconds, self.cancel.clone())?;

        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device.as_deref())?;
        let supported = device::pick_output_config(&device, Some(src_rate))?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }

        let dst_rate = stream_config.sample_rate;
        let dstq = if src_rate == dst_rate {
            srcq.clone()
        } else {
            tracing::debug!(from_hz = src_rate, to_hz = dst_rate, "resampling");
            resample::start_resampler(
                srcq.clone(),
                src_rate,
                dst_rate,
                self.config.chunk_frames,
                self.config.buffer_seconds,
            )?
        };

        let underruns = Arc::new(AtomicU64::new(0));
        let stream = stream::build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            &dstq,
            self.config.refill_max_frames,
            self.gain.clone(),
            underruns.clone(),
        )?;
        stream.play().context("start output stream")?;

        if !queue::wait_until_done_and_empty_or_cancel(&dstq, &self.cancel) {
            srcq.close();
            dstq.close();
        }
        drop(stream);
        tracing::debug!(underruns = underruns.load(Ordering::Relaxed), "output stream closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_without_load_is_rejected() {
        let sink = CpalSink::new(None, OutputConfig::default());
        assert!(matches!(sink.play(true), Err(SinkError::NothingLoaded)));
        assert!(!sink.is_busy());
    }

    #[test]
    fn load_rejects_non_audio_file() {
        let path = std::env::temp_dir().join(format!(
            "radio_stream_junk_{}.mp3",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, b"<html>not audio</html>".repeat(100)).unwrap();
        let config = OutputConfig {
            growth_wait: Duration::from_millis(10),
            ..OutputConfig::default()
        };
        let sink = CpalSink::new(None, config);
        let err = sink.load(&SinkSource::File(path.clone())).unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_rejects_missing_file() {
        let sink = CpalSink::new(None, OutputConfig::default());
        let missing = std::env::temp_dir().join("radio_stream_does_not_exist.mp3");
        assert!(sink.load(&SinkSource::File(missing)).is_err());
    }
}
