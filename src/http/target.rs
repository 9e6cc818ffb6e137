/// Scheme of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http`
    Http,
    /// `https`
    Https,
}

impl Scheme {
    /// Returns the default port of the scheme.
    #[inline]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    /// Returns string representation of the scheme.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Absolute URL split into the parts the client needs.
///
/// Only `http` and `https` schemes are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    port: u16,
    /// path and query, always starts with `/`
    path: String,
}

/// An error when parsing [`Target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTarget(&'static str);

impl std::error::Error for InvalidTarget { }

impl std::fmt::Display for InvalidTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl Target {
    /// Parse an absolute URL, e.g: `https://example.com:8443/path?q=1`.
    pub fn parse(url: &str) -> Result<Target, InvalidTarget> {
        let (scheme, rest) = match url.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => (Scheme::Http, rest),
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("https") => (Scheme::Https, rest),
            Some(_) => return Err(InvalidTarget("unsupported scheme")),
            None => return Err(InvalidTarget("missing scheme")),
        };

        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(end);

        // userinfo is not supported, but skip it rather than treating it as host
        let authority = match authority.rsplit_once('@') {
            Some((_, host)) => host,
            None => authority,
        };

        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            return Err(InvalidTarget("missing host"));
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| InvalidTarget("invalid port"))?,
            None => scheme.default_port(),
        };

        let path = match path.split_once('#') {
            Some((path, _)) => path,
            None => path,
        };
        let path = match path.as_bytes().first() {
            Some(b'/') => path.to_owned(),
            Some(_) => format!("/{path}"),
            None => "/".to_owned(),
        };

        Ok(Target {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path,
        })
    }

    /// Returns the scheme.
    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the host, without brackets for IPv6 literal.
    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, explicit or default.
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns path and query.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if the scheme is `https`.
    #[inline]
    pub fn is_tls(&self) -> bool {
        matches!(self.scheme, Scheme::Https)
    }

    /// Value for the `Host` header, the port is omitted when it is the scheme default.
    pub fn host_header(&self) -> String {
        let host = self.bracketed_host();
        if self.port == self.scheme.default_port() {
            host.into_owned()
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// `host:port`, as used by a `CONNECT` request.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    /// Absolute URL of the given path on this endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{path}", self.scheme.as_str(), self.host_header())
    }

    /// Same endpoint with another path and query, which must start with `/`.
    pub(crate) fn with_path(&self, path: String) -> Target {
        debug_assert!(path.starts_with('/'));
        Target {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
            path,
        }
    }

    fn bracketed_host(&self) -> std::borrow::Cow<'_, str> {
        if self.host.contains(':') {
            format!("[{}]", self.host).into()
        } else {
            self.host.as_str().into()
        }
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<&str>), InvalidTarget> {
    if let Some(rest) = authority.strip_prefix('[') {
        let Some((host, rest)) = rest.split_once(']') else {
            return Err(InvalidTarget("unterminated IPv6 literal"));
        };
        return match rest.strip_prefix(':') {
            Some(port) => Ok((host, Some(port))),
            None if rest.is_empty() => Ok((host, None)),
            None => Err(InvalidTarget("invalid authority")),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(port))),
        None => Ok((authority, None)),
    }
}

impl std::str::FromStr for Target {
    type Err = InvalidTarget;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url(&self.path))
    }
}

#[cfg(test)]
mod test {
    use super::{Scheme, Target};

    #[test]
    fn parse_target() {
        let t = Target::parse("http://Example.com").unwrap();
        assert_eq!(t.scheme(), Scheme::Http);
        assert_eq!(t.host(), "example.com");
        assert_eq!(t.port(), 80);
        assert_eq!(t.path(), "/");
        assert_eq!(t.host_header(), "example.com");

        let t = Target::parse("https://example.com:8443/a/b?c=d#frag").unwrap();
        assert!(t.is_tls());
        assert_eq!(t.port(), 8443);
        assert_eq!(t.path(), "/a/b?c=d");
        assert_eq!(t.host_header(), "example.com:8443");
        assert_eq!(t.authority(), "example.com:8443");

        let t = Target::parse("http://[::1]:8080?x").unwrap();
        assert_eq!(t.host(), "::1");
        assert_eq!(t.path(), "/?x");
        assert_eq!(t.authority(), "[::1]:8080");

        assert!(Target::parse("ftp://example.com").is_err());
        assert!(Target::parse("example.com").is_err());
        assert!(Target::parse("http://:80/").is_err());
        assert!(Target::parse("http://example.com:port/").is_err());
    }
}
