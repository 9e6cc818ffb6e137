/// HTTP Version.
///
/// [httpwg](https://httpwg.org/specs/rfc9112.html#http.version)
#[derive(Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Version(Inner);

#[derive(PartialEq, PartialOrd, Copy, Clone, Eq, Ord, Hash)]
enum Inner {
    Http10,
    Http11,
}

impl Version {
    /// `HTTP/1.0`
    pub const HTTP_10: Version = Version(Inner::Http10);

    /// `HTTP/1.1`
    pub const HTTP_11: Version = Version(Inner::Http11);

    /// Parse version from bytes, e.g: `b"HTTP/1.1"`.
    #[inline]
    pub const fn from_bytes(src: &[u8]) -> Option<Version> {
        match src {
            b"HTTP/1.1" => Some(Self::HTTP_11),
            b"HTTP/1.0" => Some(Self::HTTP_10),
            _ => None,
        }
    }

    /// Returns string representation of HTTP version, e.g: `HTTP/1.1`
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self.0 {
            Inner::Http10 => "HTTP/1.0",
            Inner::Http11 => "HTTP/1.1",
        }
    }

    /// Returns `true` if connections are persistent unless stated otherwise.
    #[inline]
    pub const fn is_keep_alive_default(&self) -> bool {
        matches!(self.0, Inner::Http11)
    }
}

impl Default for Version {
    #[inline]
    fn default() -> Version {
        Version::HTTP_11
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}
