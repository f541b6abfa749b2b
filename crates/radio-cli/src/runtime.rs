//! CLI runtime: directory listings, favorites and the interactive player.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use radio_catalog::{FavoritesStore, RadioBrowserClient, StationDirectory};
use radio_engine::output::{CpalSink, device};
use radio_engine::{AudioSink, EngineEvent, NullSink, PlaybackEngine, SPOOL_PREFIX, cleanup_temp_files};
use radio_types::{EngineStatus, StationRecord};
use rand::seq::IndexedRandom;

use crate::cli::FavoritesCommand;
use crate::config::Settings;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for name in device::list_devices(&host)? {
        println!("{name}");
    }
    Ok(())
}

pub fn run_top(settings: &Settings) -> Result<()> {
    let stations = directory(settings).top_voted()?;
    print_stations(&stations);
    Ok(())
}

pub fn run_search(settings: &Settings, term: &str) -> Result<()> {
    let stations = directory(settings).search(Some(term))?;
    if stations.is_empty() {
        println!("no stations match {term:?}");
    }
    print_stations(&stations);
    Ok(())
}

pub fn run_favorites(settings: &Settings, action: FavoritesCommand) -> Result<()> {
    let favorites = open_favorites(&settings.favorites_db)?;
    match action {
        FavoritesCommand::List => {
            let all = favorites.list_all();
            if all.is_empty() {
                println!("no favorites yet");
            }
            print_stations(&all);
        }
        FavoritesCommand::Add {
            url,
            name,
            country,
            genre,
            bitrate,
        } => {
            let url = url.trim().to_string();
            let station =
                StationRecord::new(name.unwrap_or_else(|| url.clone()), url, country, genre, bitrate);
            if !station.has_valid_url() {
                bail!("not a playable stream url: {}", station.url);
            }
            if !favorites.add(&station) {
                bail!("could not save favorite");
            }
            println!("added {}", station.name);
        }
        FavoritesCommand::Remove { url } => {
            let url = url.trim();
            let Some(station) = favorites.list_all().into_iter().find(|s| s.url == url) else {
                println!("{url} is not a favorite");
                return Ok(());
            };
            if !favorites.remove(&station) {
                bail!("could not remove favorite");
            }
            println!("removed {}", station.name);
        }
    }
    Ok(())
}

/// Which station `radio play` should start with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayTarget {
    Url(String),
    Random,
    /// 1-based index into the favorites list.
    Favorite(usize),
}

/// Play a station and run the interactive control shell until `quit` or EOF.
pub fn run_play(settings: &Settings, target: PlayTarget) -> Result<()> {
    let favorites = open_favorites(&settings.favorites_db)?;
    let station = resolve_station(&target, &directory(settings), &favorites)?;

    let temp_dir = settings.engine.temp_dir.clone();
    match cleanup_temp_files(&temp_dir, SPOOL_PREFIX) {
        Ok(0) => {}
        Ok(n) => tracing::info!(count = n, "cleaned up stale temp files"),
        Err(e) => tracing::warn!("temp cleanup warning: {e}"),
    }

    let mut engine_config = settings.engine.clone();
    engine_config.audio_capable = device::has_output_device(settings.device.as_deref());
    let sink: Arc<dyn AudioSink> = if engine_config.audio_capable {
        Arc::new(CpalSink::new(settings.device.clone(), settings.output.clone()))
    } else {
        println!("no audio output available, running silent");
        Arc::new(NullSink)
    };
    let engine = Arc::new(PlaybackEngine::new(sink, engine_config));

    {
        let engine = engine.clone();
        let temp_dir = temp_dir.clone();
        let _ = ctrlc::set_handler(move || {
            engine.stop();
            if let Err(e) = cleanup_temp_files(&temp_dir, SPOOL_PREFIX) {
                tracing::warn!("temp cleanup warning: {e}");
            }
            std::process::exit(130);
        });
    }
    spawn_event_printer(&engine);

    let mut shell = Shell {
        engine: &engine,
        favorites: &favorites,
        station,
    };
    shell.play_current();
    print_help();

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next() else { break };
        let line = line.context("read stdin")?;
        match parse_command(&line) {
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(cmd)) => shell.execute(cmd),
            Ok(None) => {}
            Err(msg) => println!("{msg}"),
        }
    }

    engine.stop();
    if let Err(e) = cleanup_temp_files(&temp_dir, SPOOL_PREFIX) {
        tracing::warn!("temp cleanup warning: {e}");
    }
    Ok(())
}

/// Resolve a [`PlayTarget`] to a station record.
pub fn resolve_station(
    target: &PlayTarget,
    directory: &dyn StationDirectory,
    favorites: &FavoritesStore,
) -> Result<StationRecord> {
    match target {
        PlayTarget::Url(url) => {
            let url = url.trim();
            Ok(StationRecord::new(url, url, "Unknown", "", 0))
        }
        PlayTarget::Random => {
            let stations = directory.search(None)?;
            stations
                .choose(&mut rand::rng())
                .cloned()
                .ok_or_else(|| anyhow!("station directory returned no stations"))
        }
        PlayTarget::Favorite(n) => {
            let all = favorites.list_all();
            n.checked_sub(1)
                .and_then(|i| all.get(i))
                .cloned()
                .ok_or_else(|| anyhow!("no favorite #{n} (have {})", all.len()))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    /// Restart the current station, or switch to the given URL.
    Play(Option<String>),
    Stop,
    Volume(Option<i32>),
    Status,
    /// Toggle the current station in favorites.
    Favorite,
    Help,
    Quit,
}

/// Parse one line of shell input. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => ShellCommand::Play(arg.map(str::to_string)),
        "stop" | "s" => ShellCommand::Stop,
        "vol" | "volume" | "v" => match arg {
            None => ShellCommand::Volume(None),
            Some(raw) => raw
                .parse::<i32>()
                .map(|v| ShellCommand::Volume(Some(v)))
                .map_err(|_| format!("volume must be a number, got {raw:?}"))?,
        },
        "status" => ShellCommand::Status,
        "fav" | "favorite" => ShellCommand::Favorite,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(format!("unknown command {other:?}, try help")),
    };
    Ok(Some(cmd))
}

struct Shell<'a> {
    engine: &'a PlaybackEngine,
    favorites: &'a FavoritesStore,
    station: StationRecord,
}

impl Shell<'_> {
    fn play_current(&self) {
        println!("tuning in to {} ({})", self.station.name, self.station.summary());
        if !self.engine.play(&self.station.url) {
            println!("cannot play {}", self.station.url);
        }
    }

    fn execute(&mut self, cmd: ShellCommand) {
        match cmd {
            ShellCommand::Play(None) => self.play_current(),
            ShellCommand::Play(Some(url)) => {
                self.station = self
                    .favorites
                    .list_all()
                    .into_iter()
                    .find(|s| s.url == url)
                    .unwrap_or_else(|| StationRecord::new(url.as_str(), url.as_str(), "Unknown", "", 0));
                self.play_current();
            }
            ShellCommand::Stop => self.engine.stop(),
            ShellCommand::Volume(Some(level)) => {
                self.engine.set_volume(level);
                println!("volume {}", self.engine.volume());
            }
            ShellCommand::Volume(None) => println!("volume {}", self.engine.volume()),
            ShellCommand::Status => print_status(&self.station, &self.engine.status()),
            ShellCommand::Favorite => {
                if self.favorites.is_favorite(&self.station) {
                    if self.favorites.remove(&self.station) {
                        println!("removed {} from favorites", self.station.name);
                    }
                } else if self.favorites.add(&self.station) {
                    println!("added {} to favorites", self.station.name);
                }
            }
            ShellCommand::Help => print_help(),
            ShellCommand::Quit => {}
        }
    }
}

fn spawn_event_printer(engine: &PlaybackEngine) {
    let events = engine.events();
    let spawned = std::thread::Builder::new()
        .name("radio-events".into())
        .spawn(move || {
            for event in events {
                tracing::debug!(session = event.session(), ?event, "engine event");
                match event {
                    EngineEvent::PlaybackStarted { strategy, .. } => {
                        println!("playing ({strategy:?})");
                    }
                    EngineEvent::PlaybackFailed { reason, .. } => {
                        println!("playback failed: {reason}");
                    }
                    EngineEvent::StallRecovered { restarts, .. } => {
                        println!("stream stalled, restarted (#{restarts})");
                    }
                    EngineEvent::PlaybackStopped { .. } => println!("stopped"),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "event printer unavailable");
    }
}

fn directory(settings: &Settings) -> RadioBrowserClient {
    RadioBrowserClient::new(settings.directory_url.clone(), settings.directory_timeout)
}

fn open_favorites(path: &Path) -> Result<FavoritesStore> {
    FavoritesStore::open(path).with_context(|| format!("open favorites {:?}", path))
}

fn print_stations(stations: &[StationRecord]) {
    for (i, s) in stations.iter().enumerate() {
        println!("{:>3}. {}  [{}]", i + 1, s.name, s.summary());
        println!("     {}", s.url);
    }
}

fn print_status(station: &StationRecord, status: &EngineStatus) {
    println!("station:  {}", station.name);
    println!("url:      {}", status.url.as_deref().unwrap_or("-"));
    println!("state:    {:?}", status.state);
    println!("strategy: {:?}", status.strategy);
    println!("volume:   {}", status.volume);
    println!("restarts: {}", status.restarts);
    if !status.audio_capable {
        println!("audio:    unavailable (silent)");
    }
}

fn print_help() {
    println!("commands: play [url] | stop | vol [0-100] | status | fav | help | quit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_catalog::DirectoryError;

    struct FixedDirectory(Vec<StationRecord>);

    impl StationDirectory for FixedDirectory {
        fn search(&self, _term: Option<&str>) -> Result<Vec<StationRecord>, DirectoryError> {
            Ok(self.0.clone())
        }
    }

    fn station(name: &str) -> StationRecord {
        StationRecord::new(name, format!("https://{name}.example/live"), "FR", "Jazz", 128)
    }

    #[test]
    fn parses_shell_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("stop"), Ok(Some(ShellCommand::Stop)));
        assert_eq!(parse_command("VOL 40"), Ok(Some(ShellCommand::Volume(Some(40)))));
        assert_eq!(parse_command("vol"), Ok(Some(ShellCommand::Volume(None))));
        assert_eq!(
            parse_command("play https://a.example/live"),
            Ok(Some(ShellCommand::Play(Some("https://a.example/live".into()))))
        );
        assert_eq!(parse_command("q"), Ok(Some(ShellCommand::Quit)));
        assert!(parse_command("vol loud").is_err());
        assert!(parse_command("rewind").is_err());
    }

    #[test]
    fn resolves_url_target() {
        let favorites = FavoritesStore::open_in_memory().unwrap();
        let dir = FixedDirectory(Vec::new());
        let s = resolve_station(
            &PlayTarget::Url(" https://a.example/live ".into()),
            &dir,
            &favorites,
        )
        .unwrap();
        assert_eq!(s.url, "https://a.example/live");
        assert_eq!(s.genre, "Music");
    }

    #[test]
    fn resolves_favorites_by_one_based_index() {
        let favorites = FavoritesStore::open_in_memory().unwrap();
        favorites.add(&station("first"));
        favorites.add(&station("second"));
        let dir = FixedDirectory(Vec::new());
        // Most recent first.
        let s = resolve_station(&PlayTarget::Favorite(1), &dir, &favorites).unwrap();
        assert_eq!(s.name, "second");
        assert!(resolve_station(&PlayTarget::Favorite(0), &dir, &favorites).is_err());
        assert!(resolve_station(&PlayTarget::Favorite(3), &dir, &favorites).is_err());
    }

    #[test]
    fn random_target_picks_from_directory() {
        let favorites = FavoritesStore::open_in_memory().unwrap();
        let stations = vec![station("a"), station("b"), station("c")];
        let dir = FixedDirectory(stations.clone());
        let s = resolve_station(&PlayTarget::Random, &dir, &favorites).unwrap();
        assert!(stations.contains(&s));
        assert!(resolve_station(&PlayTarget::Random, &FixedDirectory(Vec::new()), &favorites).is_err());
    }
}
