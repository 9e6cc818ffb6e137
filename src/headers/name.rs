use bytes::Bytes;

use super::error::HeaderError;

/// HTTP Header name.
///
/// # Case Normalization
///
/// Input is normalized to lowercase at construction time. [`from_static`][HeaderName::from_static]
/// will panic at compile time when name contains uppercase character.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeaderName {
    /// is valid lowercase token
    bytes: Bytes,
}

impl HeaderName {
    /// Parse header name from static bytes.
    ///
    /// # Panics
    ///
    /// Panics if the input is not a valid header name or contains ASCII uppercase characters.
    #[inline]
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        match validate_lowercase(bytes) {
            Ok(()) => Self { bytes: Bytes::from_static(bytes) },
            Err(_) => panic!("invalid static header name"),
        }
    }

    /// Parse header name, normalizing it to lowercase.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.is_empty() {
            return Err(HeaderError::InvalidName);
        }
        if !bytes.iter().all(|&b| is_token(b)) {
            return Err(HeaderError::InvalidName);
        }
        Ok(Self { bytes: Bytes::from(bytes.to_ascii_lowercase()) })
    }

    /// Returns the lowercase string representation.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: validated as ASCII token at construction
        unsafe { std::str::from_utf8_unchecked(&self.bytes) }
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

const fn validate_lowercase(bytes: &[u8]) -> Result<(), HeaderError> {
    if bytes.is_empty() {
        return Err(HeaderError::InvalidName);
    }
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !is_token(b) || b.is_ascii_uppercase() {
            return Err(HeaderError::InvalidName);
        }
        i += 1;
    }
    Ok(())
}

/// `tchar` of RFC 9110.
pub(crate) const fn is_token(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`'
            | b'|' | b'~'
    ) || b.is_ascii_alphanumeric()
}

impl std::fmt::Display for HeaderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for HeaderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.as_str())
    }
}

// ===== Lookup =====

/// A type that can be used for [`HeaderMap`][super::HeaderMap] lookup.
pub trait AsHeaderName {
    /// Returns `true` if the name equals, case-insensitively, to given lowercase name.
    fn matches(&self, lowercase: &[u8]) -> bool;
}

impl AsHeaderName for HeaderName {
    #[inline]
    fn matches(&self, lowercase: &[u8]) -> bool {
        self.bytes == lowercase
    }
}

impl AsHeaderName for &HeaderName {
    #[inline]
    fn matches(&self, lowercase: &[u8]) -> bool {
        self.bytes == lowercase
    }
}

impl AsHeaderName for &str {
    #[inline]
    fn matches(&self, lowercase: &[u8]) -> bool {
        self.as_bytes().eq_ignore_ascii_case(lowercase)
    }
}

impl AsHeaderName for String {
    #[inline]
    fn matches(&self, lowercase: &[u8]) -> bool {
        self.as_bytes().eq_ignore_ascii_case(lowercase)
    }
}

/// A type that can be converted into [`HeaderName`].
pub trait IntoHeaderName {
    /// Convert into [`HeaderName`].
    ///
    /// # Panics
    ///
    /// Panics if the input is not a valid header name.
    fn into_header_name(self) -> HeaderName;
}

impl IntoHeaderName for HeaderName {
    #[inline]
    fn into_header_name(self) -> HeaderName {
        self
    }
}

impl IntoHeaderName for &HeaderName {
    #[inline]
    fn into_header_name(self) -> HeaderName {
        self.clone()
    }
}

impl IntoHeaderName for &str {
    fn into_header_name(self) -> HeaderName {
        match HeaderName::from_bytes(self.as_bytes()) {
            Ok(ok) => ok,
            Err(err) => panic!("{err}: {self:?}"),
        }
    }
}

impl IntoHeaderName for String {
    #[inline]
    fn into_header_name(self) -> HeaderName {
        self.as_str().into_header_name()
    }
}

// ===== Standard =====

macro_rules! standard_header {
    (
        $(#[$mod_doc:meta])*
        mod $mod:ident;
        $(
            $(#[$doc:meta])*
            pub const $name:ident = $val:literal;
        )*
    ) => {
        $(#[$mod_doc])*
        pub mod $mod {
            use super::HeaderName;
            $(
                $(#[$doc])*
                pub const $name: HeaderName = HeaderName::from_static($val);
            )*
        }
    };
}

standard_header! {
    /// HTTP Standard Headers used by the client.
    mod standard;

    // ===== Authentication =====

    /// Defines the authentication method that should be used to access a resource.
    pub const WWW_AUTHENTICATE = b"www-authenticate";
    /// Contains the credentials to authenticate a user-agent with a server.
    pub const AUTHORIZATION = b"authorization";
    /// Contains the credentials to authenticate a user agent with a proxy server.
    pub const PROXY_AUTHORIZATION = b"proxy-authorization";

    // ===== Connection =====

    /// Controls whether the network connection stays open after the current transaction finishes.
    pub const CONNECTION = b"connection";
    /// Host and port number of the server to which the request is being sent.
    pub const HOST = b"host";
    /// Contains a characteristic string identifying the user agent.
    pub const USER_AGENT = b"user-agent";

    // ===== Cookies =====

    /// Contains stored HTTP cookies previously sent by the server.
    pub const COOKIE = b"cookie";
    /// Send cookies from the server to the user-agent.
    pub const SET_COOKIE = b"set-cookie";

    // ===== Message body =====

    /// The size of the resource, in decimal number of bytes.
    pub const CONTENT_LENGTH = b"content-length";
    /// Indicates the media type of the resource.
    pub const CONTENT_TYPE = b"content-type";
    /// Specifies the form of encoding used to safely transfer the resource to the user.
    pub const TRANSFER_ENCODING = b"transfer-encoding";
}
