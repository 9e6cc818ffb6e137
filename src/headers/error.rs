/// An error when constructing header name or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Header name is empty or contains non token character.
    InvalidName,
    /// Header value contains CR, LF or NUL.
    InvalidValue,
}

impl std::error::Error for HeaderError { }

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => f.write_str("invalid header name"),
            Self::InvalidValue => f.write_str("invalid header value"),
        }
    }
}
