//! Decode stage: probe a media source with Symphonia and stream interleaved `f32`
//! samples into a [`SharedAudio`] queue from a background thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::queue::{SharedAudio, calc_max_buffered_samples};

/// A probed stream ready for decoding.
pub struct Probed {
    format: Box<dyn FormatReader>,
    params: CodecParameters,
    pub rate: u32,
    pub channels: usize,
}

impl Probed {
    pub fn codec_name(&self) -> Option<&'static str> {
        codec_name_from_params(&self.params)
    }
}

/// Identify the container and pick the default audio track.
pub fn probe(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Probed> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unrecognized audio stream")?;
    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let params = track.codec_params.clone();
    let rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let channels = params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| anyhow!("unknown channel layout"))?;
    Ok(Probed {
        format,
        params,
        rate,
        channels,
    })
}

/// Spawn the decoder thread. The returned queue is closed on end of stream,
/// on a fatal decode error, or once `cancel` is set.
pub fn start_decode(
    probed: Probed,
    buffer_seconds: f32,
    cancel: Arc<AtomicBool>,
) -> Result<Arc<SharedAudio>> {
    let Probed {
        format,
        params,
        rate,
        channels,
    } = probed;
    let queue = Arc::new(SharedAudio::new(
        channels,
        calc_max_buffered_samples(rate, channels, buffer_seconds),
    ));
    let decoder =
        symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let out = queue.clone();
    std::thread::Builder::new()
        .name("radio-decode".into())
        .spawn(move || {
            decode_loop(format, decoder, &out, &cancel);
            out.close();
        })
        .context("spawn decoder thread")?;
    Ok(queue)
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    mut decoder: Box<dyn symphonia::core::codecs::Decoder>,
    queue: &SharedAudio,
    cancel: &AtomicBool,
) {
    while !cancel.load(Ordering::Relaxed) {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stream ended");
                break;
            }
        };
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt frames are common right after joining a live stream.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "decoder error");
                break;
            }
        };
        let mut samples = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        samples.copy_interleaved_ref(decoded);
        queue.push_interleaved_blocking(samples.samples());
    }
}

fn codec_name_from_params(params: &CodecParameters) -> Option<&'static str> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        _ => return None,
    };
    Some(name)
}
