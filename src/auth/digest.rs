//! HTTP Digest Access Authentication.
//!
//! [RFC2617](https://www.rfc-editor.org/rfc/rfc2617)
use super::hash::{hex, md5};
use super::{AuthError, Challenge};

/// Digest challenge parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: Algorithm,
    /// `true` if the server offers `qop=auth`.
    pub qop_auth: bool,
}

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Md5Sess,
}

impl Algorithm {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Md5Sess => "MD5-sess",
        }
    }
}

impl DigestChallenge {
    /// Extract digest parameters from a parsed challenge.
    pub fn from_challenge(challenge: &Challenge) -> Result<Self, AuthError> {
        let nonce = challenge
            .param("nonce")
            .ok_or(AuthError::InvalidChallenge("digest challenge without nonce"))?;

        let algorithm = match challenge.param("algorithm") {
            None => Algorithm::Md5,
            Some(alg) if alg.eq_ignore_ascii_case("md5") => Algorithm::Md5,
            Some(alg) if alg.eq_ignore_ascii_case("md5-sess") => Algorithm::Md5Sess,
            Some(alg) => return Err(AuthError::UnsupportedAlgorithm(alg.to_owned())),
        };

        let qop_auth = match challenge.param("qop") {
            None => false,
            Some(qop) => {
                let auth = qop.split(',').any(|e| e.trim().eq_ignore_ascii_case("auth"));
                if !auth {
                    return Err(AuthError::UnsupportedQop(qop.to_owned()));
                }
                true
            }
        };

        Ok(Self {
            realm: challenge.param("realm").unwrap_or_default().to_owned(),
            nonce: nonce.to_owned(),
            opaque: challenge.param("opaque").map(ToOwned::to_owned),
            algorithm,
            qop_auth,
        })
    }

    /// Compute the `response` value.
    ///
    /// `nc` and `cnonce` only take part when `qop=auth`, or with `MD5-sess`.
    pub fn response(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let mut ha1 = hex(&md5(format!("{username}:{}:{password}", self.realm).as_bytes()));
        if self.algorithm == Algorithm::Md5Sess {
            ha1 = hex(&md5(format!("{ha1}:{}:{cnonce}", self.nonce).as_bytes()));
        }
        let ha2 = hex(&md5(format!("{method}:{uri}").as_bytes()));

        let kd = if self.qop_auth {
            format!("{ha1}:{}:{nc:08x}:{cnonce}:auth:{ha2}", self.nonce)
        } else {
            format!("{ha1}:{}:{ha2}", self.nonce)
        };
        hex(&md5(kd.as_bytes()))
    }

    /// Build the `Authorization` header value.
    pub fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let response = self.response(username, password, method, uri, nc, cnonce);

        let mut out = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}",
            quote(username),
            quote(&self.realm),
            quote(&self.nonce),
            quote(uri),
            self.algorithm.as_str(),
        );
        if self.qop_auth {
            out.push_str(&format!(", qop=auth, nc={nc:08x}, cnonce=\"{cnonce}\""));
        }
        out.push_str(&format!(", response=\"{response}\""));
        if let Some(opaque) = &self.opaque {
            out.push_str(&format!(", opaque=\"{}\"", quote(opaque)));
        }
        out
    }
}

/// Escape a quoted-string value.
fn quote(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['"', '\\']) {
        value.replace('\\', "\\\\").replace('"', "\\\"").into()
    } else {
        value.into()
    }
}
