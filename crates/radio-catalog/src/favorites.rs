//! Favorite stations persisted in SQLite.
//!
//! Every operation reports failure as `false` or an empty list and logs the
//! cause; a broken database never takes the player down.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use radio_types::StationRecord;
use rusqlite::{Connection, params};

pub struct FavoritesStore {
    conn: Mutex<Connection>,
}

impl FavoritesStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "create favorites dir failed");
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                country TEXT NOT NULL,
                genre TEXT NOT NULL,
                bitrate INTEGER NOT NULL DEFAULT 0,
                added_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `station`. Adding a URL that is already a favorite keeps the
    /// existing entry and still succeeds.
    pub fn add(&self, station: &StationRecord) -> bool {
        let added_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let result = self.conn().execute(
            "INSERT OR IGNORE INTO favorites (name, url, country, genre, bitrate, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                station.name,
                station.url,
                station.country,
                station.genre,
                station.bitrate,
                added_at
            ],
        );
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(url = %station.url, error = %e, "add favorite failed");
                false
            }
        }
    }

    /// Forget `station`, matched by URL. Removing an unknown station succeeds.
    pub fn remove(&self, station: &StationRecord) -> bool {
        let url = station.url.as_str();
        match self.conn().execute("DELETE FROM favorites WHERE url = ?1", params![url]) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(url, error = %e, "remove favorite failed");
                false
            }
        }
    }

    /// Whether a favorite with the URL of `station` exists.
    pub fn is_favorite(&self, station: &StationRecord) -> bool {
        let url = station.url.as_str();
        let conn = self.conn();
        let found = conn
            .prepare_cached("SELECT 1 FROM favorites WHERE url = ?1")
            .and_then(|mut stmt| stmt.exists(params![url]));
        match found {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url, error = %e, "favorite lookup failed");
                false
            }
        }
    }

    /// All favorites, most recently added first.
    pub fn list_all(&self) -> Vec<StationRecord> {
        match self.query_all() {
            Ok(stations) => stations,
            Err(e) => {
                tracing::warn!(error = %e, "list favorites failed");
                Vec::new()
            }
        }
    }

    fn query_all(&self) -> rusqlite::Result<Vec<StationRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT name, url, country, genre, bitrate FROM favorites
             ORDER BY added_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StationRecord::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
            ))
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str, url: &str) -> StationRecord {
        StationRecord::new(name, url, "France", "Jazz", 128)
    }

    #[test]
    fn favorites_round_trip() {
        let store = FavoritesStore::open_in_memory().unwrap();
        let fip = station("FIP", "https://fip.example/live.mp3");
        assert!(!store.is_favorite(&fip));

        assert!(store.add(&fip));
        assert!(store.is_favorite(&fip));
        assert_eq!(store.list_all(), vec![fip.clone()]);

        assert!(store.remove(&fip));
        assert!(!store.is_favorite(&fip));
        assert!(store.list_all().is_empty());
        assert!(store.remove(&fip));
    }

    #[test]
    fn duplicate_add_keeps_single_entry() {
        let store = FavoritesStore::open_in_memory().unwrap();
        let first = station("FIP", "https://fip.example/live.mp3");
        let renamed = station("FIP Jazz", "https://fip.example/live.mp3");
        assert!(store.add(&first));
        assert!(store.add(&renamed));
        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "FIP");
        // Lookups key on the URL only.
        assert!(store.is_favorite(&renamed));
        assert!(store.remove(&renamed));
        assert!(!store.is_favorite(&first));
    }

    #[test]
    fn list_is_most_recent_first() {
        let store = FavoritesStore::open_in_memory().unwrap();
        let a = station("A", "https://a.example/live");
        let b = station("B", "https://b.example/live");
        let c = station("C", "https://c.example/live");
        for s in [&a, &b, &c] {
            assert!(store.add(s));
        }
        let names: Vec<_> = store.list_all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn file_backed_store_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!(
            "radio-catalog-favorites-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let path = dir.join("favorites.db");
        let fip = station("FIP", "https://fip.example/live.mp3");
        {
            let store = FavoritesStore::open(&path).unwrap();
            assert!(store.add(&fip));
        }
        let store = FavoritesStore::open(&path).unwrap();
        assert!(store.is_favorite(&fip));
        assert_eq!(store.list_all()[0].bitrate, 128);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
