use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "radio", version = VERSION, about = "Internet radio player")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Favorites database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Directory for stream spool files
    #[arg(long, global = true)]
    pub temp_dir: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the top-voted stations
    Top,

    /// Search stations by name
    Search { term: String },

    /// Play a station and control it interactively
    #[command(group(
        ArgGroup::new("station")
            .required(true)
            .args(["url", "random", "favorite"])
    ))]
    Play {
        /// Stream URL
        url: Option<String>,

        /// Pick a random top-voted station
        #[arg(long)]
        random: bool,

        /// Play favorite number N (as shown by `favorites list`)
        #[arg(long, value_name = "N")]
        favorite: Option<usize>,
    },

    /// Manage favorite stations
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
    List,
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "Unknown")]
        country: String,
        #[arg(long, default_value = "")]
        genre: String,
        /// Bitrate in kbps
        #[arg(long, default_value_t = 0)]
        bitrate: u32,
    },
    Remove {
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_requires_a_station_source() {
        assert!(Args::try_parse_from(["radio", "play"]).is_err());
        assert!(Args::try_parse_from(["radio", "play", "--random", "--favorite", "1"]).is_err());
        let args = Args::try_parse_from(["radio", "play", "--favorite", "2"]).unwrap();
        assert!(matches!(
            args.cmd,
            Some(Command::Play {
                favorite: Some(2),
                ..
            })
        ));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let args = Args::try_parse_from([
            "radio",
            "search",
            "jazz",
            "--db",
            "/tmp/fav.db",
            "--device",
            "USB",
        ])
        .unwrap();
        assert_eq!(args.db, Some(PathBuf::from("/tmp/fav.db")));
        assert_eq!(args.device.as_deref(), Some("USB"));
        assert!(matches!(args.cmd, Some(Command::Search { ref term }) if term == "jazz"));
    }

    #[test]
    fn favorites_add_defaults() {
        let args =
            Args::try_parse_from(["radio", "favorites", "add", "https://fip.example/live"]).unwrap();
        match args.cmd {
            Some(Command::Favorites {
                action:
                    FavoritesCommand::Add {
                        url,
                        name,
                        country,
                        bitrate,
                        ..
                    },
            }) => {
                assert_eq!(url, "https://fip.example/live");
                assert!(name.is_none());
                assert_eq!(country, "Unknown");
                assert_eq!(bitrate, 0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
