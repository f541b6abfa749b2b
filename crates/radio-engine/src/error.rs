//! Error kinds at the engine's I/O boundaries.
//!
//! Each boundary (sink call, HTTP call, spool write) reports its own kind so the
//! fallback protocol can decide per call site whether to fall through, fail the
//! session, or ignore the error.

/// The audio sink refused or failed an instruction.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No usable output device.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    /// The source could not be opened or probed.
    #[error("sink rejected source: {0}")]
    Rejected(String),
    /// `play` was called without a loaded source.
    #[error("no source loaded")]
    NothingLoaded,
}

/// Opening a remote stream failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Transport(String),
    #[error("unexpected http status {0}")]
    Status(u16),
}

/// Why one fallback strategy did not reach the Playing state.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("spool file error: {0}")]
    Spool(#[from] std::io::Error),
    /// The server answered, but with too little data to be audio.
    #[error("downloaded only {bytes} bytes, need at least {min}")]
    Undersized { bytes: u64, min: u64 },
    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_error_messages_carry_details() {
        let err = AttemptError::Undersized { bytes: 12, min: 1024 };
        assert_eq!(err.to_string(), "downloaded only 12 bytes, need at least 1024");

        let err = AttemptError::from(FetchError::Status(404));
        assert_eq!(err.to_string(), "unexpected http status 404");
    }
}
