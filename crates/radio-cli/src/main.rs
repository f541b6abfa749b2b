//! `radio`: browse internet radio stations and play them from the terminal.
//!
//! ## Commands
//! - `top` / `search <term>`: list stations from the radio-browser directory.
//! - `play <url> | --random | --favorite N`: start playback and open a small
//!   control shell (`stop`, `play`, `vol N`, `status`, `fav`, `quit`).
//! - `favorites list|add|remove`: manage the SQLite favorites list.

use anyhow::Result;
use clap::Parser;
use radio_cli::cli::{Args, Command};
use radio_cli::config::Settings;
use radio_cli::runtime::{self, PlayTarget};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn,radio_cli=info,radio_engine=info,radio_catalog=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let settings = Settings::from_args(&args)?;
    match args.cmd {
        None | Some(Command::Top) => runtime::run_top(&settings),
        Some(Command::Search { term }) => runtime::run_search(&settings, &term),
        Some(Command::Favorites { action }) => runtime::run_favorites(&settings, action),
        Some(Command::Play {
            url,
            random,
            favorite,
        }) => {
            let target = match (url, favorite) {
                (Some(url), _) => PlayTarget::Url(url),
                (None, Some(n)) => PlayTarget::Favorite(n),
                (None, None) => {
                    debug_assert!(random);
                    PlayTarget::Random
                }
            };
            runtime::run_play(&settings, target)
        }
    }
}
