//! Output device discovery and selection.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// First output device whose name contains `needle` (case-insensitive), or the
/// host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("no output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .map(|desc| matches_device_name(&desc.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no output device matched: {needle}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Whether audio output is possible at all on this host.
pub fn has_output_device(needle: Option<&str>) -> bool {
    let host = cpal::default_host();
    match pick_device(&host, needle) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable");
            false
        }
    }
}

/// Best supported output config for a stream at `target_rate`.
///
/// Prefers the highest rate not above the target, then the most precise sample
/// format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in device
        .supported_output_configs()
        .context("query output configs")?
    {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = target_rate.is_none_or(|t| rate <= t);
        let rank = sample_format_rank(range.sample_format());
        let replace = best.as_ref().is_none_or(|(b_below, b_rate, b_rank, _)| {
            is_better_candidate((below, rate, rank), (*b_below, *b_rate, *b_rank))
        });
        if replace {
            best = Some((below, rate, rank, range.with_sample_rate(rate)));
        }
    }
    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("no supported output configs"))
}

/// Largest fixed buffer the device allows, capped at 16384 frames. `None` keeps
/// the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 16_384;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Names of all output devices, for `--list-devices`.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("no output devices")?;
    let mut names = Vec::new();
    for d in devices {
        names.push(d.description()?.name().to_string());
    }
    Ok(names)
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Compare `(at_or_below_target, rate, format_rank)` candidates.
fn is_better_candidate(candidate: (bool, u32, u8), best: (bool, u32, u8)) -> bool {
    let (below, rate, rank) = candidate;
    let (best_below, best_rate, best_rank) = best;
    if below != best_below {
        below
    } else if rate != best_rate {
        rate > best_rate
    } else {
        rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
