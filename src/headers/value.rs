use bytes::Bytes;

use super::error::HeaderError;

/// HTTP Header value.
///
/// Contains no CR, LF or NUL bytes, so it is always safe to serialize.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeaderValue {
    bytes: Bytes,
}

impl HeaderValue {
    /// Create [`HeaderValue`] from static str.
    ///
    /// # Panics
    ///
    /// Panics if the input contains invalid bytes.
    pub const fn from_static(value: &'static str) -> Self {
        match validate(value.as_bytes()) {
            Ok(()) => Self { bytes: Bytes::from_static(value.as_bytes()) },
            Err(_) => panic!("invalid static header value"),
        }
    }

    /// Create [`HeaderValue`] from bytes.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, HeaderError> {
        let bytes = bytes.into();
        validate(&bytes)?;
        Ok(Self { bytes })
    }

    /// Create [`HeaderValue`] from a string, replacing forbidden bytes with a space.
    pub fn from_string(value: impl Into<String>) -> Self {
        let mut value = value.into();
        if validate(value.as_bytes()).is_err() {
            value = value.replace(['\r', '\n', '\0'], " ");
        }
        Self { bytes: Bytes::from(value) }
    }

    /// Returns the value as str, if it is valid UTF-8.
    #[inline]
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Returns the value as lossy str.
    #[inline]
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Returns the underlying bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns `true` if the value is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

const fn validate(bytes: &[u8]) -> Result<(), HeaderError> {
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'\r' | b'\n' | b'\0') {
            return Err(HeaderError::InvalidValue);
        }
        i += 1;
    }
    Ok(())
}

impl From<&'static str> for HeaderValue {
    #[inline]
    fn from(value: &'static str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for HeaderValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl PartialEq<str> for HeaderValue {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for HeaderValue {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl std::fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str_lossy())
    }
}
