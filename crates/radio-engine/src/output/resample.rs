//! Sample-rate conversion between the decoder and the output device.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use super::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};

/// Spawn a resampler thread converting `srcq` from `src_rate` to `dst_rate`.
///
/// The returned queue is closed once `srcq` is closed and its tail was flushed.
pub fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_rate: u32,
    dst_rate: u32,
    chunk_frames: usize,
    buffer_seconds: f32,
) -> Result<Arc<SharedAudio>> {
    if src_rate == 0 {
        return Err(anyhow!("source sample rate is zero"));
    }
    let channels = srcq.channels();
    let dstq = Arc::new(SharedAudio::new(
        channels,
        calc_max_buffered_samples(dst_rate, channels, buffer_seconds),
    ));

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk_frames = chunk_frames.max(1);
    let ratio = dst_rate as f64 / src_rate as f64;

    let out = dstq.clone();
    std::thread::Builder::new()
        .name("radio-resample".into())
        .spawn(move || {
            let resampler = match Async::<f32>::new_sinc(
                ratio,
                1.1,
                &params,
                chunk_frames,
                channels,
                FixedAsync::Input,
            ) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "resampler init failed");
                    out.close();
                    return;
                }
            };
            let mut stage = Stage {
                resampler,
                channels,
                out: vec![0.0f32; channels * chunk_frames * 3],
            };
            if let Err(e) = stage.run(&srcq, &out, chunk_frames) {
                tracing::error!(error = %e, "resampler stopped");
            }
            out.close();
        })
        .context("spawn resampler thread")?;

    Ok(dstq)
}

struct Stage {
    resampler: Async<f32>,
    channels: usize,
    out: Vec<f32>,
}

impl Stage {
    fn run(&mut self, srcq: &SharedAudio, dstq: &SharedAudio, chunk_frames: usize) -> Result<()> {
        while let Some(chunk) = srcq.pop(PopStrategy::BlockingExact { frames: chunk_frames }) {
            self.process(&chunk, None, dstq)?;
        }
        while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo { max_frames: chunk_frames }) {
            let frames = tail.len() / self.channels;
            self.process(&tail, Some(frames), dstq)?;
        }
        Ok(())
    }

    /// Resample one chunk; `partial` marks a short final chunk.
    fn process(&mut self, input: &[f32], partial: Option<usize>, dstq: &SharedAudio) -> Result<()> {
        let in_frames = input.len() / self.channels;
        let input = InterleavedSlice::new(input, self.channels, in_frames)
            .map_err(|e| anyhow!("input buffer: {e}"))?;
        let out_frames = self.out.len() / self.channels;
        let mut output = InterleavedSlice::new_mut(&mut self.out, self.channels, out_frames)
            .map_err(|e| anyhow!("output buffer: {e}"))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: partial,
        };
        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;
        let samples = produced * self.channels;
        if samples > 0 {
            dstq.push_interleaved_blocking(&self.out[..samples]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_source_rate() {
        let srcq = Arc::new(SharedAudio::new(2, 64));
        assert!(start_resampler(srcq, 0, 48_000, 256, 1.0).is_err());
    }

    #[test]
    fn closes_output_when_source_closes() {
        let srcq = Arc::new(SharedAudio::new(2, 48_000));
        let dstq = start_resampler(srcq.clone(), 44_100, 48_000, 256, 1.0).unwrap();
        srcq.push_interleaved_blocking(&vec![0.0f32; 2 * 1000]);
        srcq.close();
        let mut produced = 0;
        while let Some(v) = dstq.pop(PopStrategy::BlockingUpTo { max_frames: 4096 }) {
            produced += v.len();
        }
        assert!(produced > 0);
        assert!(dstq.is_done());
    }
}
