use thiserror::Error;

/// Errors produced while extracting metadata from an audio file.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Truncated {what}: needed {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
