//! HTTP access for the progressive download strategy.

use std::io::{self, Read};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::FetchError;

/// Desktop browser User-Agent; several stream hosts refuse unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const PUMP_CHUNK_BYTES: usize = 16 * 1024;
const PUMP_QUEUE_CHUNKS: usize = 16;

/// Opens a remote stream and hands back its body as a plain byte reader.
pub trait StreamFetcher: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// Blocking HTTP fetcher backed by ureq.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    /// `timeout` bounds connecting, waiting for the response head and every gap
    /// between body bytes. The body as a whole is unbounded since live streams
    /// never end.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl StreamFetcher for HttpFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let resp = ureq::get(url)
            .config()
            .timeout_connect(Some(self.timeout))
            .timeout_recv_response(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", "audio/*,*/*;q=0.9")
            .header("Accept-Encoding", "identity")
            .header("Connection", "keep-alive")
            .call()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status != ureq::http::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        tracing::debug!(url, content_type = %content_type, "stream response opened");

        let (_, body) = resp.into_parts();
        let reader = IdleTimeoutReader::spawn(body.into_reader(), self.timeout)
            .map_err(|e| FetchError::Transport(format!("spawn body reader: {e}")))?;
        Ok(Box::new(reader))
    }
}

/// Reader that fails with `TimedOut` when the wrapped reader produces nothing for
/// `idle_timeout`.
///
/// A pump thread does the blocking reads. Dropping the reader disconnects the
/// queue and the pump exits after its current read returns.
pub struct IdleTimeoutReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    idle_timeout: Duration,
    pending: Vec<u8>,
    pos: usize,
    done: bool,
}

impl IdleTimeoutReader {
    pub fn spawn<R: Read + Send + 'static>(inner: R, idle_timeout: Duration) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(PUMP_QUEUE_CHUNKS);
        std::thread::Builder::new()
            .name("radio-http-body".into())
            .spawn(move || pump(inner, tx))?;
        Ok(Self {
            rx,
            idle_timeout,
            pending: Vec::new(),
            pos: 0,
            done: false,
        })
    }
}

impl Read for IdleTimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            if self.done {
                return Ok(0);
            }
            match self.rx.recv_timeout(self.idle_timeout) {
                Ok(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no stream data for {:?}", self.idle_timeout),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => self.done = true,
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn pump<R: Read>(mut inner: R, tx: Sender<io::Result<Vec<u8>>>) {
    let mut buf = vec![0u8; PUMP_CHUNK_BYTES];
    loop {
        match inner.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Instant;

    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(0)
        }
    }

    #[test]
    fn idle_reader_passes_data_through_to_eof() {
        let data: Vec<u8> = (0..50_000u32).map(|i| i as u8).collect();
        let mut reader =
            IdleTimeoutReader::spawn(Cursor::new(data.clone()), Duration::from_secs(1)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn idle_reader_times_out_on_silent_body() {
        let mut reader = IdleTimeoutReader::spawn(Stalled, Duration::from_millis(50)).unwrap();
        let started = Instant::now();
        let err = reader.read(&mut [0u8; 64]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
