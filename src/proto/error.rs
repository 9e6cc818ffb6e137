use crate::body::error::BodyError;

/// HTTP response parsing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Response head exceeds the size limit.
    TooLarge,
    /// Too many header fields.
    TooManyHeaders,
    /// Malformed status line.
    InvalidStatusLine,
    /// Unsupported HTTP version.
    UnsupportedVersion,
    /// Status code is not three digits.
    InvalidStatus,
    /// Malformed header field.
    InvalidHeader,
    /// Message body framing error.
    Body(BodyError),
    /// Server sent bytes while no request is in flight.
    Unsolicited,
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Body(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::TooLarge => f.write_str("response head too large"),
            Self::TooManyHeaders => f.write_str("too many headers"),
            Self::InvalidStatusLine => f.write_str("invalid status line"),
            Self::UnsupportedVersion => f.write_str("unsupported version"),
            Self::InvalidStatus => f.write_str("invalid status code"),
            Self::InvalidHeader => f.write_str("invalid header"),
            Self::Body(err) => write!(f, "body error: {err}"),
            Self::Unsolicited => f.write_str("unsolicited response data"),
        }
    }
}

impl From<BodyError> for ParseError {
    #[inline]
    fn from(value: BodyError) -> Self {
        Self::Body(value)
    }
}
