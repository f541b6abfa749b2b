//! Station discovery over the radio-browser JSON API.

use std::time::Duration;

use radio_types::{DEFAULT_GENRE, StationRecord, is_valid_stream_url};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://all.api.radio-browser.info";
const USER_AGENT: &str = "RadioPlayer/1.0";
const TOP_VOTED_LIMIT: u32 = 50;
const SEARCH_LIMIT: u32 = 40;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("station directory request failed: {0}")]
    Transport(String),
    #[error("station directory returned status {0}")]
    Status(u16),
    #[error("invalid station directory response: {0}")]
    Decode(String),
}

/// Source of station listings.
pub trait StationDirectory: Send + Sync {
    /// Top-voted stations when `term` is empty or absent, otherwise a name search.
    fn search(&self, term: Option<&str>) -> Result<Vec<StationRecord>, DirectoryError>;
}

/// Client for a radio-browser mirror.
#[derive(Clone, Debug)]
pub struct RadioBrowserClient {
    base_url: String,
    timeout: Duration,
}

impl Default for RadioBrowserClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(10))
    }
}

impl RadioBrowserClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn top_voted(&self) -> Result<Vec<StationRecord>, DirectoryError> {
        self.search(None)
    }

    fn fetch(&self, term: Option<&str>) -> Result<String, DirectoryError> {
        let request = match term {
            None => ureq::get(format!("{}/json/stations/topvote/{TOP_VOTED_LIMIT}", self.base_url)),
            Some(term) => ureq::get(format!("{}/json/stations/search", self.base_url))
                .query("name", term)
                .query("limit", SEARCH_LIMIT.to_string()),
        };
        let mut resp = request
            .config()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        let status = resp.status();
        if status != ureq::http::StatusCode::OK {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        resp.body_mut()
            .read_to_string()
            .map_err(|e| DirectoryError::Transport(format!("read response body: {e}")))
    }
}

impl StationDirectory for RadioBrowserClient {
    fn search(&self, term: Option<&str>) -> Result<Vec<StationRecord>, DirectoryError> {
        let term = term.map(str::trim).filter(|t| !t.is_empty());
        let body = self.fetch(term)?;
        let stations = parse_stations(&body)?;
        tracing::debug!(term = term.unwrap_or("<top>"), count = stations.len(), "stations loaded");
        Ok(stations)
    }
}

/// One entry of the radio-browser station list; only the fields we use.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiStation {
    name: Option<String>,
    url: Option<String>,
    country: Option<String>,
    tags: Option<String>,
    bitrate: Option<i64>,
}

/// Decode a station list, dropping entries without a playable URL.
pub fn parse_stations(body: &str) -> Result<Vec<StationRecord>, DirectoryError> {
    let raw: Vec<ApiStation> =
        serde_json::from_str(body).map_err(|e| DirectoryError::Decode(e.to_string()))?;
    Ok(raw.into_iter().filter_map(ApiStation::into_record).collect())
}

impl ApiStation {
    fn into_record(self) -> Option<StationRecord> {
        let url = self.url.unwrap_or_default().trim().to_string();
        if !is_valid_stream_url(&url) {
            return None;
        }
        let country = self
            .country
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        Some(StationRecord::new(
            self.name.unwrap_or_default().trim(),
            url,
            country,
            genre_from_tags(self.tags.as_deref()),
            self.bitrate.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32,
        ))
    }
}

/// First comma-separated tag, title-cased; "Music" when there is none.
fn genre_from_tags(tags: Option<&str>) -> String {
    let first = tags.and_then(|t| t.split(',').next()).unwrap_or("").trim();
    if first.is_empty() {
        DEFAULT_GENRE.to_string()
    } else {
        title_case(first)
    }
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_stations() {
        let body = r#"[
            {"name": "  Jazz FM ", "url": " https://jazz.example/live.mp3 ", "country": "United Kingdom ",
             "tags": "smooth jazz,jazz", "bitrate": 128, "votes": 1000},
            {"name": "No Tags", "url": "http://notags.example/stream", "tags": "", "bitrate": null}
        ]"#;
        let stations = parse_stations(body).unwrap();
        assert_eq!(stations.len(), 2);

        let jazz = &stations[0];
        assert_eq!(jazz.name, "Jazz FM");
        assert_eq!(jazz.url, "https://jazz.example/live.mp3");
        assert_eq!(jazz.country, "United Kingdom");
        assert_eq!(jazz.genre, "Smooth Jazz");
        assert_eq!(jazz.bitrate, 128);

        let plain = &stations[1];
        assert_eq!(plain.genre, "Music");
        assert_eq!(plain.country, "Unknown");
        assert_eq!(plain.bitrate, 0);
    }

    #[test]
    fn drops_stations_with_unplayable_urls() {
        let body = r#"[
            {"name": "Local", "url": "http://localhost:8000/stream"},
            {"name": "Short", "url": "http://a.b"},
            {"name": "Ftp", "url": "ftp://radio.example/stream"},
            {"name": "Missing"},
            {"name": "Good", "url": "https://good.example/stream"}
        ]"#;
        let stations = parse_stations(body).unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].name, "Good");
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(
            parse_stations("<html>busy</html>"),
            Err(DirectoryError::Decode(_))
        ));
        assert!(parse_stations("[]").unwrap().is_empty());
    }

    #[test]
    fn title_case_matches_tag_conventions() {
        assert_eq!(title_case("hip hop"), "Hip Hop");
        assert_eq!(title_case("ROCK"), "Rock");
        assert_eq!(title_case("80s"), "80S");
        assert_eq!(title_case("drum-and-bass"), "Drum-And-Bass");
    }

    #[test]
    fn unreachable_directory_reports_transport_error() {
        let client = RadioBrowserClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        assert!(matches!(
            client.search(Some("jazz")),
            Err(DirectoryError::Transport(_))
        ));
    }
}
