//! CPAL output stage.
//!
//! The real-time callback refills a local buffer from the queue without blocking,
//! maps channels, applies the volume gain and converts to the device format.
//! Underruns are filled with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use super::queue::{PopStrategy, SharedAudio};

/// Linear gain shared between the sink and the audio callback, stored as `f32` bits.
#[derive(Clone, Debug)]
pub struct Gain(Arc<AtomicU32>);

impl Gain {
    pub fn new(level: f32) -> Self {
        Self(Arc::new(AtomicU32::new(level.clamp(0.0, 1.0).to_bits())))
    }

    pub fn set(&self, level: f32) {
        let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Build (but do not start) an output stream that drains `queue`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    refill_max_frames: usize,
    gain: Gain,
    underruns: Arc<AtomicU64>,
) -> Result<cpal::Stream> {
    let args = (device, config, queue, refill_max_frames, gain, underruns);
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(args),
        cpal::SampleFormat::I16 => build_stream::<i16>(args),
        cpal::SampleFormat::I32 => build_stream::<i32>(args),
        cpal::SampleFormat::U16 => build_stream::<u16>(args),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

type StreamArgs<'a> = (
    &'a cpal::Device,
    &'a cpal::StreamConfig,
    &'a Arc<SharedAudio>,
    usize,
    Gain,
    Arc<AtomicU64>,
);

fn build_stream<T>(
    (device, config, queue, refill_max_frames, gain, underruns): StreamArgs<'_>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels).max(1);
    let refill_max_frames = refill_max_frames.max(1);
    let queue = queue.clone();
    let mut local = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let volume = gain.get();
            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if local.pos >= local.src.len() {
                    local.pos = 0;
                    match queue.pop(PopStrategy::NonBlocking {
                        max_frames: refill_max_frames,
                    }) {
                        Some(v) => local.src = v,
                        None => {
                            local.src.clear();
                            underruns.fetch_add(1, Ordering::Relaxed);
                            data[frame * channels_out..].fill(T::from_sample(0.0f32));
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = local.next_mapped(channels_out, ch) * volume;
                    data[frame * channels_out + ch] = T::from_sample(sample);
                }
            }
        },
        |err| tracing::warn!(error = %err, "output stream error"),
        None,
    )?;
    Ok(stream)
}

/// Samples taken from the queue and not yet written to the device.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl LocalBuffer {
    /// Sample for output channel `dst_ch` of the current frame. Mono is duplicated,
    /// stereo is averaged down to mono, other layouts clamp to the last source
    /// channel. The frame advances after the last output channel.
    fn next_mapped(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.pos >= self.src.len() {
            return 0.0;
        }
        let frame = &self.src[self.pos..];
        let get = |ch: usize| {
            if ch < self.src_channels {
                frame.get(ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let out = match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get(0) + get(1)),
            (1, _) => get(0),
            (src, _) => get(dst_ch.min(src.saturating_sub(1))),
        };
        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_clamps_and_round_trips() {
        let gain = Gain::new(0.75);
        assert_eq!(gain.get(), 0.75);
        gain.set(1.5);
        assert_eq!(gain.get(), 1.0);
        gain.set(-0.2);
        assert_eq!(gain.get(), 0.0);
        gain.set(f32::NAN);
        assert_eq!(gain.get(), 0.0);
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 1,
            src: vec![0.25, 0.5],
        };
        assert_eq!(buf.next_mapped(2, 0), 0.25);
        assert_eq!(buf.next_mapped(2, 1), 0.25);
        assert_eq!(buf.next_mapped(2, 0), 0.5);
        assert_eq!(buf.next_mapped(2, 1), 0.5);
        assert_eq!(buf.next_mapped(2, 0), 0.0);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![1.0, 0.0, 0.5, 0.5],
        };
        assert_eq!(buf.next_mapped(1, 0), 0.5);
        assert_eq!(buf.next_mapped(1, 0), 0.5);
    }

    #[test]
    fn stereo_passes_through() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![0.1, 0.2],
        };
        assert_eq!(buf.next_mapped(2, 0), 0.1);
        assert_eq!(buf.next_mapped(2, 1), 0.2);
    }
}
