//! Media sources for the decoder: a spool file that may still be growing, or a
//! remote stream read front to back.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use symphonia::core::io::{MediaSource, ReadOnlySource};
use symphonia::core::probe::Hint;

use crate::fetch::StreamFetcher;
use crate::sink::SinkSource;

const GROWTH_POLL: Duration = Duration::from_millis(50);

/// Read view of a file another thread keeps appending to.
///
/// At the current end of file a read waits for more bytes, up to `growth_wait`,
/// before reporting EOF. A set `cancel` flag ends the wait immediately.
pub struct GrowingFileSource {
    file: File,
    pos: u64,
    growth_wait: Duration,
    cancel: Arc<AtomicBool>,
}

impl GrowingFileSource {
    pub fn open(path: &Path, growth_wait: Duration, cancel: Arc<AtomicBool>) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            pos: 0,
            growth_wait,
            cancel,
        })
    }

    fn available(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len().saturating_sub(self.pos))
    }
}

impl Read for GrowingFileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.growth_wait;
        while self.available()? == 0 {
            if self.cancel.load(Ordering::Relaxed) || Instant::now() >= deadline {
                return Ok(0);
            }
            std::thread::sleep(GROWTH_POLL);
        }
        self.file.seek(SeekFrom::Start(self.pos))?;
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for GrowingFileSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(x) => Some(x),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.file.metadata()?.len().checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.pos = target;
        Ok(target)
    }
}

impl MediaSource for GrowingFileSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// `Read` adapter that makes a `Send`-only reader usable where `Sync` is required.
struct SyncReader(Mutex<Box<dyn Read + Send>>);

impl Read for SyncReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .read(buf)
    }
}

/// Open `source` for decoding, with a format hint derived from its name.
pub fn open_media_source(
    source: &SinkSource,
    fetcher: &dyn StreamFetcher,
    growth_wait: Duration,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<(Box<dyn MediaSource>, Hint)> {
    let mut hint = Hint::new();
    match source {
        SinkSource::File(path) => {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                hint.with_extension(ext);
            }
            let file = GrowingFileSource::open(path, growth_wait, cancel)
                .map_err(|e| anyhow::anyhow!("open {}: {e}", path.display()))?;
            Ok((Box::new(file), hint))
        }
        SinkSource::Url(url) => {
            if let Some(ext) = infer_ext_from_url(url) {
                hint.with_extension(&ext);
            }
            let body = fetcher.open(url)?;
            let reader = ReadOnlySource::new(SyncReader(Mutex::new(body)));
            Ok((Box::new(reader), hint))
        }
    }
}

/// Extension of the last path segment, ignoring the query string.
pub fn infer_ext_from_url(url: &str) -> Option<String> {
    let tail = url.split(['?', '#']).next().unwrap_or(url);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn infer_ext_from_url_handles_query_and_missing_ext() {
        assert_eq!(
            infer_ext_from_url("http://radio.example/live.MP3?sid=1"),
            Some("mp3".to_string())
        );
        assert_eq!(infer_ext_from_url("http://radio.example/live"), None);
        assert_eq!(
            infer_ext_from_url("https://radio.example/a.b.aac#x"),
            Some("aac".to_string())
        );
    }

    #[test]
    fn growing_file_source_sees_appended_bytes() {
        let path = std::env::temp_dir().join(format!(
            "radio_stream_grow_{}.mp3",
            uuid::Uuid::new_v4().simple()
        ));
        let mut writer = File::create(&path).unwrap();
        writer.write_all(b"abc").unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let mut src =
            GrowingFileSource::open(&path, Duration::from_millis(500), cancel.clone()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(src.read(&mut buf).unwrap(), 3);

        let appender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            writer.write_all(b"defg").unwrap();
            writer.flush().unwrap();
        });
        assert_eq!(src.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"defg");
        appender.join().unwrap();

        cancel.store(true, Ordering::Relaxed);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn growing_file_source_reports_eof_after_growth_wait() {
        let path = std::env::temp_dir().join(format!(
            "radio_stream_eof_{}.mp3",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, b"xy").unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut src = GrowingFileSource::open(&path, Duration::from_millis(60), cancel).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert_eq!(src.seek(SeekFrom::Start(1)).unwrap(), 1);
        assert_eq!(src.read(&mut buf).unwrap(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
