//! Temp spool files for the progressive download strategy.

use std::io;
use std::path::{Path, PathBuf};

/// File name prefix of every spool file the engine creates.
pub const SPOOL_PREFIX: &str = "radio_stream_";

/// Build a unique spool path: `<dir>/radio_stream_<8 hex>.mp3`.
pub fn make_spool_path(dir: &Path) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("{SPOOL_PREFIX}{}.mp3", &id[..8]))
}

/// Remove stale spool files, e.g. left behind by a crashed process.
pub fn cleanup_temp_files(dir: &Path, prefix: &str) -> io::Result<usize> {
    let mut removed = 0usize;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if !file_name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        if std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// A spool file owned by one session. Removing it consumes the handle, so a path
/// is deleted at most once.
#[derive(Debug)]
pub struct SpoolFile {
    path: PathBuf,
}

impl SpoolFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. A file that is already gone is not an error.
    pub fn remove(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "spool file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove spool file")
            }
        }
    }
}
