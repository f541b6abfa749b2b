//! Configuration loading: optional TOML file, overridden by CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use radio_engine::EngineConfig;
use radio_engine::output::OutputConfig;
use serde::Deserialize;

use crate::cli::Args;

/// Top-level config file schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Output device substring.
    pub device: Option<String>,
    /// Favorites SQLite file.
    pub favorites_db: Option<PathBuf>,
    pub engine: Option<EngineSection>,
    pub output: Option<OutputSection>,
    pub directory: Option<DirectorySection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineSection {
    pub chunk_bytes: Option<usize>,
    pub priming_chunks: Option<usize>,
    pub min_playable_bytes: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub temp_dir: Option<PathBuf>,
    pub initial_volume: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSection {
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
    pub buffer_seconds: Option<f32>,
    pub growth_wait_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectorySection {
    /// radio-browser mirror, e.g. `https://de1.api.radio-browser.info`.
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Fully resolved settings for one CLI run.
#[derive(Clone, Debug)]
pub struct Settings {
    pub engine: EngineConfig,
    pub output: OutputConfig,
    pub device: Option<String>,
    pub favorites_db: PathBuf,
    pub directory_url: String,
    pub directory_timeout: Duration,
}

impl Settings {
    /// Load the config file named by `--config` (if any) and apply CLI overrides.
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, args))
    }

    pub fn resolve(file: FileConfig, args: &Args) -> Self {
        let mut engine = EngineConfig::default();
        if let Some(e) = file.engine {
            if let Some(v) = e.chunk_bytes {
                engine.chunk_bytes = v.max(1);
            }
            if let Some(v) = e.priming_chunks {
                engine.priming_chunks = v.max(1);
            }
            if let Some(v) = e.min_playable_bytes {
                engine.min_playable_bytes = v;
            }
            if let Some(ms) = e.poll_interval_ms {
                engine.poll_interval = Duration::from_millis(ms.max(10));
            }
            if let Some(secs) = e.http_timeout_secs {
                engine.http_timeout = Duration::from_secs(secs.max(1));
            }
            if let Some(dir) = e.temp_dir {
                engine.temp_dir = dir;
            }
            if let Some(v) = e.initial_volume {
                engine.initial_volume = v.min(100);
            }
        }
        if let Some(dir) = &args.temp_dir {
            engine.temp_dir = dir.clone();
        }

        let mut output = OutputConfig {
            http_timeout: engine.http_timeout,
            ..OutputConfig::default()
        };
        if let Some(o) = file.output {
            if let Some(v) = o.chunk_frames {
                output.chunk_frames = v.max(1);
            }
            if let Some(v) = o.refill_max_frames {
                output.refill_max_frames = v.max(1);
            }
            if let Some(v) = o.buffer_seconds {
                output.buffer_seconds = v;
            }
            if let Some(ms) = o.growth_wait_ms {
                output.growth_wait = Duration::from_millis(ms);
            }
        }

        let directory = file.directory.unwrap_or_default();
        Self {
            engine,
            output,
            device: normalize_device_name(args.device.clone().or(file.device)),
            favorites_db: args
                .db
                .clone()
                .or(file.favorites_db)
                .unwrap_or_else(|| PathBuf::from("favorites.db")),
            directory_url: directory
                .base_url
                .unwrap_or_else(|| radio_catalog::directory::DEFAULT_BASE_URL.to_string()),
            directory_timeout: Duration::from_secs(directory.timeout_secs.unwrap_or(10).max(1)),
        }
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
