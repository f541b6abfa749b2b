//! The two-strategy fallback protocol and the background download continuation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::Arc;

use radio_types::{PlaybackState, PlaybackStrategy};

use crate::engine::Shared;
use crate::error::{AttemptError, FetchError};
use crate::events::EngineEvent;
use crate::liveness;
use crate::session::{CancelToken, Session};
use crate::sink::SinkSource;
use crate::spool::make_spool_path;

/// Body of a session worker thread: the fallback protocol and, once audio plays,
/// the liveness loop.
///
/// Workers of superseded sessions may still be winding down; they never touch the
/// sink again because every sink call re-checks the cancel token under the sink lock.
pub(crate) fn run_session(shared: Arc<Shared>, session: Arc<Session>) {
    if session.cancel.is_cancelled() {
        return;
    }

    match start_playback(&shared, &session) {
        Ok(strategy) => {
            tracing::info!(
                session = session.id,
                url = %session.url,
                strategy = ?strategy,
                "playback started"
            );
            shared.emit(EngineEvent::PlaybackStarted {
                session: session.id,
                url: session.url.clone(),
                strategy,
            });
            liveness::watch(&shared, &session);
        }
        Err(AttemptError::Cancelled) => {
            session.release_spool();
            tracing::debug!(session = session.id, "session cancelled during startup");
        }
        Err(e) => {
            session.release_spool();
            if session.cancel.is_cancelled() || !session.transition(PlaybackState::Failed) {
                return;
            }
            tracing::warn!(session = session.id, url = %session.url, error = %e, "playback failed");
            shared.emit(EngineEvent::PlaybackFailed {
                session: session.id,
                url: session.url.clone(),
                reason: e.to_string(),
            });
        }
    }
}

fn start_playback(shared: &Shared, session: &Session) -> Result<PlaybackStrategy, AttemptError> {
    match try_direct(shared, session) {
        Ok(()) => return Ok(PlaybackStrategy::Direct),
        Err(AttemptError::Cancelled) => return Err(AttemptError::Cancelled),
        Err(e) => {
            tracing::info!(
                session = session.id,
                error = %e,
                "direct stream rejected, falling back to progressive download"
            );
        }
    }
    try_progressive(shared, session)?;
    Ok(PlaybackStrategy::ProgressiveDownload)
}

fn try_direct(shared: &Shared, session: &Session) -> Result<(), AttemptError> {
    ensure_live(&session.cancel)?;
    let source = SinkSource::Url(session.url.clone());
    start_output(shared, session, PlaybackStrategy::Direct, source)
}

fn try_progressive(shared: &Shared, session: &Session) -> Result<(), AttemptError> {
    ensure_live(&session.cancel)?;
    let config = &shared.config;
    let path = make_spool_path(&config.temp_dir);
    let Some(mut file) = session.create_spool(path.clone())? else {
        return Err(AttemptError::Cancelled);
    };
    tracing::debug!(
        session = session.id,
        path = %path.display(),
        target_bytes = config.priming_bytes(),
        "spooling stream"
    );

    let mut reader = shared.fetcher.open(&session.url)?;
    let mut chunk = vec![0u8; config.chunk_bytes.max(1)];
    let mut written = 0u64;
    let mut chunks = 0usize;
    while chunks < config.priming_chunks {
        ensure_live(&session.cancel)?;
        let n = read_chunk(&mut reader, &mut chunk)
            .map_err(|e| FetchError::Transport(format!("read stream body: {e}")))?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n])?;
        written += n as u64;
        chunks += 1;
    }
    file.flush()?;

    if written < config.min_playable_bytes {
        return Err(AttemptError::Undersized {
            bytes: written,
            min: config.min_playable_bytes,
        });
    }
    tracing::debug!(session = session.id, bytes = written, "priming complete");

    let source = SinkSource::File(path);
    start_output(shared, session, PlaybackStrategy::ProgressiveDownload, source)?;

    let cancel = session.cancel.clone();
    let id = session.id;
    let spawned = std::thread::Builder::new()
        .name(format!("radio-download-{id}"))
        .spawn(move || continue_download(id, reader, file, cancel, chunk));
    if let Err(e) = spawned {
        tracing::warn!(session = id, error = %e, "failed to spawn download continuation");
    }
    Ok(())
}

/// Load `source`, apply the stored volume and start the sink, unless the session
/// was cancelled.
///
/// The sink lock keeps another session's load from landing between our load and
/// play. The start itself runs under the gate so a concurrent `stop()` either
/// happens before (and the start is skipped) or after (and stops what was started).
fn start_output(
    shared: &Shared,
    session: &Session,
    strategy: PlaybackStrategy,
    source: SinkSource,
) -> Result<(), AttemptError> {
    let _sink = shared.lock_sink();
    ensure_live(&session.cancel)?;
    shared.sink.load(&source)?;
    let _gate = shared.lock_gate();
    ensure_live(&session.cancel)?;
    shared.sink.set_volume(shared.volume_level());
    shared.sink.play(true)?;
    if !session.mark_playing(strategy, Some(source)) {
        return Err(AttemptError::Cancelled);
    }
    Ok(())
}

fn ensure_live(cancel: &CancelToken) -> Result<(), AttemptError> {
    if cancel.is_cancelled() {
        Err(AttemptError::Cancelled)
    } else {
        Ok(())
    }
}

/// Fill `buf` completely unless the stream ends first. Returns the byte count.
fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Keep appending the response body to the spool file while the session lives.
fn continue_download(
    session: u64,
    mut reader: Box<dyn Read + Send>,
    mut file: File,
    cancel: CancelToken,
    mut chunk: Vec<u8>,
) {
    let mut appended = 0u64;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let n = match read_chunk(&mut reader, &mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(session, error = %e, "download continuation read ended");
                break;
            }
        };
        if let Err(e) = file.write_all(&chunk[..n]).and_then(|()| file.flush()) {
            tracing::debug!(session, error = %e, "download continuation write ended");
            break;
        }
        appended += n as u64;
    }
    tracing::debug!(session, bytes = appended, "download continuation finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn read_chunk_fills_across_short_reads() {
        let mut reader = Trickle {
            data: Cursor::new(vec![7u8; 100]),
            step: 3,
        };
        let mut buf = [0u8; 64];
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 64);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 36);
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn continuation_stops_immediately_when_cancelled() {
        let path = std::env::temp_dir().join(format!(
            "radio_stream_test_{}.mp3",
            uuid::Uuid::new_v4().simple()
        ));
        let file = File::create(&path).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        continue_download(1, Box::new(Cursor::new(vec![1u8; 4096])), file, cancel, vec![0; 512]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn continuation_appends_until_eof() {
        let path = std::env::temp_dir().join(format!(
            "radio_stream_test_{}.mp3",
            uuid::Uuid::new_v4().simple()
        ));
        let file = File::create(&path).unwrap();
        continue_download(
            1,
            Box::new(Cursor::new(vec![1u8; 5000])),
            file,
            CancelToken::new(),
            vec![0; 512],
        );
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5000);
        let _ = std::fs::remove_file(&path);
    }
}
