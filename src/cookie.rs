//! Cookie storage.
//!
//! [`CookieStore`] keeps cookies received through `Set-Cookie` and selects the ones to send back
//! following the domain, path, secure and expiry rules of [RFC6265].
//!
//! [RFC6265]: https://www.rfc-editor.org/rfc/rfc6265
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use crate::http::{Scheme, Target};
use crate::log::trace;

/// A stored cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    /// lowercase, without leading dot
    domain: String,
    host_only: bool,
    path: String,
    secure: bool,
    expires: Option<SystemTime>,
    /// insertion sequence, orders cookies of equal path length
    seq: u64,
}

impl Cookie {
    /// Returns the cookie name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cookie value.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the domain the cookie is scoped to.
    #[inline]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the path the cookie is scoped to.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` if the cookie is only sent over `https`.
    #[inline]
    pub fn secure(&self) -> bool {
        self.secure
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    fn matches(&self, scheme: Scheme, host: &str, path: &str, now: SystemTime) -> bool {
        if self.is_expired(now) {
            return false;
        }
        if self.secure && scheme != Scheme::Https {
            return false;
        }
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_match(host, &self.domain)
        };
        domain_ok && path_match(path, &self.path)
    }
}

/// In memory cookie storage.
#[derive(Debug, Default)]
pub struct CookieStore {
    cookies: Vec<Cookie>,
    seq: u64,
}

impl CookieStore {
    /// Create new empty [`CookieStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw `Set-Cookie` value received from `url`.
    ///
    /// Malformed cookies, or cookies for a domain `url` cannot set, are discarded. Returns `true`
    /// if the cookie was accepted.
    pub fn set(&mut self, url: &str, raw: &str) -> bool {
        match Target::parse(url) {
            Ok(target) => self.set_at(&target, SystemTime::now(), raw),
            Err(_) => false,
        }
    }

    pub(crate) fn set_at(&mut self, target: &Target, now: SystemTime, raw: &str) -> bool {
        let Some(cookie) = parse_set_cookie(target, now, raw, self.seq) else {
            trace!("dropping malformed cookie from {}: {raw:?}", target.host());
            return false;
        };
        self.seq += 1;

        self.cookies.retain(|e| {
            !(e.name == cookie.name && e.domain == cookie.domain && e.path == cookie.path)
        });

        if !cookie.is_expired(now) {
            self.cookies.push(cookie);
        }
        true
    }

    /// Returns `name=value` of every cookie applicable to `url`.
    ///
    /// Cookies with longer paths come first, a name is listed once.
    pub fn get(&self, url: &str) -> Vec<String> {
        match Target::parse(url) {
            Ok(target) => self
                .matching(&target, SystemTime::now())
                .map(|e| format!("{}={}", e.name, e.value))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns every cookie applicable to `url` as name-value map.
    pub fn get_hash(&self, url: &str) -> HashMap<String, String> {
        match Target::parse(url) {
            Ok(target) => self.get_hash_at(&target, SystemTime::now()),
            Err(_) => HashMap::new(),
        }
    }

    pub(crate) fn get_hash_at(&self, target: &Target, now: SystemTime) -> HashMap<String, String> {
        self.matching(target, now)
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    }

    /// Returns the `Cookie` header value for `target`, `None` if no cookie applies.
    pub(crate) fn header_value(&self, target: &Target, now: SystemTime) -> Option<String> {
        let mut out = String::new();
        for cookie in self.matching(target, now) {
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(&cookie.name);
            out.push('=');
            out.push_str(&cookie.value);
        }
        (!out.is_empty()).then_some(out)
    }

    /// Remove every cookie.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Returns the number of stored cookies, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if no cookie is stored.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Returns an iterator over stored cookies.
    pub fn iter(&self) -> std::slice::Iter<'_, Cookie> {
        self.cookies.iter()
    }

    fn matching(&self, target: &Target, now: SystemTime) -> impl Iterator<Item = &Cookie> {
        let path = request_path(target.path());
        let mut found: Vec<&Cookie> = self
            .cookies
            .iter()
            .filter(|e| e.matches(target.scheme(), target.host(), path, now))
            .collect();
        found.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.seq.cmp(&b.seq)));

        let mut unique: Vec<&Cookie> = Vec::with_capacity(found.len());
        for cookie in found {
            if !unique.iter().any(|e| e.name == cookie.name) {
                unique.push(cookie);
            }
        }
        unique.into_iter()
    }
}

/// Shared handle to the [`CookieStore`] of an endpoint.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    store: Rc<RefCell<CookieStore>>,
}

impl CookieJar {
    /// Create new empty [`CookieJar`].
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`CookieStore::set`].
    pub fn set(&self, url: &str, raw: &str) -> bool {
        self.store.borrow_mut().set(url, raw)
    }

    /// See [`CookieStore::get`].
    pub fn get(&self, url: &str) -> Vec<String> {
        self.store.borrow().get(url)
    }

    /// See [`CookieStore::get_hash`].
    pub fn get_hash(&self, url: &str) -> HashMap<String, String> {
        self.store.borrow().get_hash(url)
    }

    /// See [`CookieStore::clear`].
    pub fn clear(&self) {
        self.store.borrow_mut().clear();
    }

    /// Run `f` with the underlying store.
    pub fn with<R>(&self, f: impl FnOnce(&mut CookieStore) -> R) -> R {
        f(&mut self.store.borrow_mut())
    }
}

// ===== Parsing =====

fn parse_set_cookie(target: &Target, now: SystemTime, raw: &str, seq: u64) -> Option<Cookie> {
    let mut parts = raw.split(';');

    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_matches('"');
    if name.is_empty() || name.bytes().any(|b| b.is_ascii_control()) {
        return None;
    }

    let mut domain = None;
    let mut path = None;
    let mut secure = false;
    let mut expires = None;
    let mut max_age = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((key, val)) => (key.trim(), val.trim()),
            None => (attr.trim(), ""),
        };
        if key.eq_ignore_ascii_case("expires") {
            // an unparsable date leaves the cookie a session cookie
            expires = httpdate::parse_http_date(val).ok();
        } else if key.eq_ignore_ascii_case("max-age") {
            max_age = parse_max_age(val, now).or(max_age);
        } else if key.eq_ignore_ascii_case("domain") {
            let val = val.trim_start_matches('.');
            if !val.is_empty() {
                domain = Some(val.to_ascii_lowercase());
            }
        } else if key.eq_ignore_ascii_case("path") {
            if val.starts_with('/') {
                path = Some(val.to_owned());
            }
        } else if key.eq_ignore_ascii_case("secure") {
            secure = true;
        }
    }

    let host = target.host();
    let (domain, host_only) = match domain {
        Some(domain) if domain_match(host, &domain) => (domain, false),
        Some(_) => return None,
        None => (host.to_owned(), true),
    };

    Some(Cookie {
        name: name.to_owned(),
        value: value.to_owned(),
        domain,
        host_only,
        path: path.unwrap_or_else(|| default_path(request_path(target.path())).to_owned()),
        secure,
        expires: max_age.or(expires),
        seq,
    })
}

fn parse_max_age(val: &str, now: SystemTime) -> Option<SystemTime> {
    let secs: i64 = val.parse().ok()?;
    if secs <= 0 {
        return Some(SystemTime::UNIX_EPOCH);
    }
    now.checked_add(Duration::from_secs(secs.unsigned_abs()))
}

/// Path without query.
fn request_path(path: &str) -> &str {
    match path.split_once('?') {
        Some((path, _)) => path,
        None => path,
    }
}

/// [RFC6265 5.1.4](https://www.rfc-editor.org/rfc/rfc6265#section-5.1.4)
fn default_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// [RFC6265 5.1.3](https://www.rfc-editor.org/rfc/rfc6265#section-5.1.3)
fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    // IP addresses only match exactly
    if host.parse::<std::net::IpAddr>().is_ok() {
        return false;
    }
    host.strip_suffix(domain)
        .is_some_and(|prefix| prefix.ends_with('.'))
}

/// [RFC6265 5.1.4](https://www.rfc-editor.org/rfc/rfc6265#section-5.1.4)
fn path_match(request: &str, cookie: &str) -> bool {
    match request.strip_prefix(cookie) {
        Some(rest) => cookie.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
