use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("end of buffer")]
    Eof,

    #[error("deadline exceeded")]
    Timeout,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("server error {code}: {detail}")]
    Server { code: String, detail: String },

    #[error("{method} failed after retries exhausted")]
    TransportFailure { method: String },

    #[error("stream closed")]
    StreamClosed,

    #[error("frame payload exceeds mtu: {0} bytes")]
    FrameTooLarge(usize),

    #[error("unknown flag byte: {0}")]
    UnknownFlag(u8),

    #[error("{0}")]
    Io(#[source] IoError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
