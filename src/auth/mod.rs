//! Challenge-response authentication.
//!
//! - [`Credentials`] configured per request
//! - [`Challenge`] parsed `WWW-Authenticate` value
//! - [`AuthSession`] per request handshake state, answering at most one challenge
mod hash;
pub mod digest;
pub mod ntlm;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::http::Method;
use crate::log::debug;

pub use hash::{hmac_md5, md4, md5};

/// Authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Digest authentication.
    Digest { username: String, password: String },
    /// NTLM authentication.
    Ntlm {
        username: String,
        password: String,
        domain: String,
        workstation: String,
    },
}

impl Credentials {
    /// Digest credentials.
    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Digest {
            username: username.into(),
            password: password.into(),
        }
    }

    /// NTLM credentials.
    pub fn ntlm(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self::Ntlm {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            workstation: String::new(),
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Self::Digest { .. } => "Digest",
            Self::Ntlm { .. } => "NTLM",
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digest { username, .. } => f
                .debug_struct("Digest")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Ntlm { username, domain, .. } => f
                .debug_struct("Ntlm")
                .field("username", username)
                .field("domain", domain)
                .finish_non_exhaustive(),
        }
    }
}

/// Authentication error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Server did not offer a challenge for the configured scheme.
    NoChallenge(&'static str),
    /// Challenge could not be parsed.
    InvalidChallenge(&'static str),
    /// Digest algorithm other than `MD5` or `MD5-sess`.
    UnsupportedAlgorithm(String),
    /// Digest without `qop=auth` support.
    UnsupportedQop(String),
    /// System random generator failed.
    Random,
}

impl std::error::Error for AuthError { }

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoChallenge(scheme) => write!(f, "server did not offer {scheme} authentication"),
            Self::InvalidChallenge(msg) => write!(f, "invalid challenge: {msg}"),
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported digest algorithm: {alg}"),
            Self::UnsupportedQop(qop) => write!(f, "unsupported digest qop: {qop}"),
            Self::Random => f.write_str("failed to generate client nonce"),
        }
    }
}

// ===== Challenge =====

/// A single authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    /// `token68` form, e.g: NTLM messages.
    pub token: Option<String>,
    /// `auth-param` form, names are lowercase.
    pub params: Vec<(String, String)>,
}

impl Challenge {
    /// Returns the value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the scheme matches, case-insensitively.
    pub fn is(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }
}

/// Parse every challenge of `WWW-Authenticate` values.
///
/// A single value may carry multiple comma separated challenges.
pub fn parse_challenges<I, S>(values: I) -> Vec<Challenge>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<Challenge> = Vec::new();
    for value in values {
        for item in split_quoted(value.as_ref()) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let space = item.find([' ', '\t']);
            let eq = item.find('=');

            match (space, eq) {
                // `scheme` or `scheme rest`
                (Some(sp), eq) if eq.is_none_or(|eq| sp < eq) => {
                    let (scheme, rest) = item.split_at(sp);
                    let mut challenge = Challenge {
                        scheme: scheme.to_owned(),
                        token: None,
                        params: Vec::new(),
                    };
                    let rest = rest.trim();
                    if is_token68(rest) {
                        challenge.token = Some(rest.to_owned());
                    } else if let Some(param) = parse_param(rest) {
                        challenge.params.push(param);
                    }
                    out.push(challenge);
                }
                (None, None) => out.push(Challenge {
                    scheme: item.to_owned(),
                    token: None,
                    params: Vec::new(),
                }),
                // continuation `name=value` of the previous challenge
                _ => {
                    if let (Some(last), Some(param)) = (out.last_mut(), parse_param(item)) {
                        last.params.push(param);
                    }
                }
            }
        }
    }
    out
}

/// Split on commas outside quoted strings.
fn split_quoted(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

fn parse_param(item: &str) -> Option<(String, String)> {
    let (name, value) = item.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(quoted) => unescape(quoted),
        None => value.to_owned(),
    };
    Some((name.to_ascii_lowercase(), value))
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn is_token68(s: &str) -> bool {
    let body = s.trim_end_matches('=');
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/'))
}

// ===== Session =====

/// Authentication handshake state of a single request.
#[derive(Debug)]
pub struct AuthSession {
    credentials: Credentials,
    /// Whether a challenge was already answered.
    answered: bool,
    nc: u32,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            answered: false,
            nc: 0,
        }
    }

    /// `Authorization` value sent with the first attempt.
    ///
    /// NTLM starts its handshake without waiting for a challenge.
    pub fn initial(&self) -> Option<String> {
        match &self.credentials {
            Credentials::Ntlm { .. } => Some(format!("NTLM {}", STANDARD.encode(ntlm::negotiate()))),
            Credentials::Digest { .. } => None,
        }
    }

    /// Returns `true` if a `401` may still be answered.
    #[inline]
    pub fn can_retry(&self) -> bool {
        !self.answered
    }

    /// Returns `true` while the handshake is bound to the current connection.
    ///
    /// NTLM authenticates the connection, its `Authenticate` message must follow the challenge
    /// on the same socket.
    #[inline]
    pub fn holds_connection(&self) -> bool {
        matches!(self.credentials, Credentials::Ntlm { .. }) && !self.answered
    }

    /// Compute the `Authorization` value answering a `401` response.
    ///
    /// Must be called at most once, see [`can_retry`][AuthSession::can_retry].
    pub fn respond(
        &mut self,
        challenges: &[String],
        method: Method,
        uri: &str,
    ) -> Result<String, AuthError> {
        debug_assert!(!self.answered);
        self.answered = true;

        let challenges = parse_challenges(challenges);
        let scheme = self.credentials.scheme();
        let Some(challenge) = challenges.iter().find(|e| e.is(scheme)) else {
            return Err(AuthError::NoChallenge(scheme));
        };
        debug!("answering {scheme} challenge for {method} {uri}");

        match &self.credentials {
            Credentials::Digest { username, password } => {
                let digest = digest::DigestChallenge::from_challenge(challenge)?;
                self.nc += 1;
                let cnonce = hash::hex(&random_bytes()?);
                Ok(digest.authorization(username, password, method.as_str(), uri, self.nc, &cnonce))
            }
            Credentials::Ntlm { username, password, domain, workstation } => {
                let Some(token) = &challenge.token else {
                    return Err(AuthError::InvalidChallenge("NTLM challenge without message"));
                };
                let msg = STANDARD
                    .decode(token)
                    .map_err(|_| AuthError::InvalidChallenge("NTLM message is not base64"))?;
                let challenge = ntlm::parse_challenge(&msg)?;
                let msg = ntlm::Authenticate {
                    username,
                    password,
                    domain,
                    workstation,
                    client_challenge: random_bytes()?,
                    timestamp: ntlm::filetime_now(),
                }
                .encode(&challenge);
                Ok(format!("NTLM {}", STANDARD.encode(msg)))
            }
        }
    }
}

/// Client nonce from the system CSPRNG.
fn random_bytes() -> Result<[u8; 8], AuthError> {
    use ring::rand::{SecureRandom, SystemRandom};

    let mut bytes = [0u8; 8];
    SystemRandom::new().fill(&mut bytes).map_err(|_| AuthError::Random)?;
    Ok(bytes)
}
