//! Per-session state shared between the engine and its background threads.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use radio_types::{PlaybackState, PlaybackStrategy};

use crate::sink::SinkSource;
use crate::spool::SpoolFile;

/// One-way cancellation flag. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Progress {
    state: PlaybackState,
    strategy: PlaybackStrategy,
    /// Source handed to the sink by the winning strategy; reused on stall restarts.
    source: Option<SinkSource>,
    restarts: u32,
}

#[derive(Debug, Default)]
struct SpoolSlot {
    file: Option<SpoolFile>,
    /// Set once the spool was released; no new file may be created afterwards.
    closed: bool,
}

/// One attempt to play one URL.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) url: String,
    pub(crate) cancel: CancelToken,
    progress: Mutex<Progress>,
    spool: Mutex<SpoolSlot>,
}

impl Session {
    pub(crate) fn new(id: u64, url: String) -> Self {
        Self {
            id,
            url,
            cancel: CancelToken::new(),
            progress: Mutex::new(Progress {
                state: PlaybackState::Starting,
                strategy: PlaybackStrategy::None,
                source: None,
                restarts: 0,
            }),
            spool: Mutex::new(SpoolSlot::default()),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.progress().state
    }

    pub(crate) fn strategy(&self) -> PlaybackStrategy {
        self.progress().strategy
    }

    pub(crate) fn restarts(&self) -> u32 {
        self.progress().restarts
    }

    pub(crate) fn source(&self) -> Option<SinkSource> {
        self.progress().source.clone()
    }

    /// Move to `next` if the state machine allows it. Terminal states never change
    /// and a stopping session can only become stopped.
    pub(crate) fn transition(&self, next: PlaybackState) -> bool {
        let mut progress = self.progress();
        let allowed = match progress.state {
            state if state.is_terminal() => false,
            PlaybackState::Stopping => next == PlaybackState::Stopped,
            _ => true,
        };
        if allowed {
            progress.state = next;
        }
        allowed
    }

    /// Record the strategy that produced audio and enter Playing.
    pub(crate) fn mark_playing(&self, strategy: PlaybackStrategy, source: Option<SinkSource>) -> bool {
        if !self.transition(PlaybackState::Playing) {
            return false;
        }
        let mut progress = self.progress();
        progress.strategy = strategy;
        progress.source = source;
        true
    }

    pub(crate) fn record_restart(&self) -> u32 {
        let mut progress = self.progress();
        progress.restarts = progress.restarts.saturating_add(1);
        progress.restarts
    }

    fn spool_slot(&self) -> MutexGuard<'_, SpoolSlot> {
        self.spool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the session's spool file at `path`.
    ///
    /// Returns `Ok(None)` when the spool was already released, which happens once
    /// the session is stopped.
    pub(crate) fn create_spool(&self, path: PathBuf) -> io::Result<Option<File>> {
        let mut slot = self.spool_slot();
        if slot.closed {
            return Ok(None);
        }
        let file = File::create(&path)?;
        slot.file = Some(SpoolFile::new(path));
        Ok(Some(file))
    }

    /// Delete the spool file if there is one and refuse any later `create_spool`.
    pub(crate) fn release_spool(&self) {
        let spool = {
            let mut slot = self.spool_slot();
            slot.closed = true;
            slot.file.take()
        };
        if let Some(spool) = spool {
            spool.remove();
        }
    }

    pub(crate) fn spool_path(&self) -> Option<PathBuf> {
        self.spool_slot().file.as_ref().map(|s| s.path().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_and_monotonic() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let session = Session::new(1, "https://radio.example/live".into());
        assert_eq!(session.state(), PlaybackState::Starting);
        assert!(session.transition(PlaybackState::Failed));
        assert!(!session.transition(PlaybackState::Playing));
        assert!(!session.mark_playing(PlaybackStrategy::Direct, None));
        assert_eq!(session.state(), PlaybackState::Failed);
        assert_eq!(session.strategy(), PlaybackStrategy::None);
    }

    #[test]
    fn stopping_only_leads_to_stopped() {
        let session = Session::new(1, "https://radio.example/live".into());
        assert!(session.transition(PlaybackState::Stopping));
        assert!(!session.transition(PlaybackState::Failed));
        assert!(!session.transition(PlaybackState::Playing));
        assert!(session.transition(PlaybackState::Stopped));
    }

    #[test]
    fn released_spool_is_deleted_and_cannot_be_recreated() {
        let dir = std::env::temp_dir().join(format!(
            "radio-engine-session-{}",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let session = Session::new(7, "https://radio.example/live".into());

        let path = dir.join("radio_stream_00000001.mp3");
        let file = session.create_spool(path.clone()).unwrap();
        assert!(file.is_some());
        assert!(path.exists());
        assert_eq!(session.spool_path(), Some(path.clone()));

        session.release_spool();
        assert!(!path.exists());
        session.release_spool();

        let again = session.create_spool(dir.join("radio_stream_00000002.mp3")).unwrap();
        assert!(again.is_none());
        assert!(!dir.join("radio_stream_00000002.mp3").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
