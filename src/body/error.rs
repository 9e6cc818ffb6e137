use std::fmt;

/// Message body framing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyError {
    /// Server error where chunked format is invalid.
    InvalidChunked,
    /// Server error where chunked length is too large.
    ChunkTooLarge,
    /// `Content-Length` is not a number, or multiple differing values are given.
    InvalidContentLength,
    /// Both `Transfer-Encoding` and `Content-Length` are present.
    InvalidCodings,
}

impl BodyError {
    const fn message(&self) -> &'static str {
        match self {
            Self::InvalidChunked => "invalid chunked format",
            Self::ChunkTooLarge => "chunk too large",
            Self::InvalidContentLength => "invalid content-length",
            Self::InvalidCodings => "both transfer-encoding and content-length present",
        }
    }
}

impl std::error::Error for BodyError { }

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
