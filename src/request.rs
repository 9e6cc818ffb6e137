//! HTTP Request.
//!
//! - [`RequestOptions`] per call options
//! - [`Parts`] mutable request representation handed to interceptors
//! - [`RequestInterceptor`] transformation applied before serialization
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::io;
use std::time::SystemTime;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::auth::{AuthSession, Credentials};
use crate::body::{BodyStream, Frame, Payload, WireBody};
use crate::cookie::CookieJar;
use crate::endpoint::EndpointConfig;
use crate::error::Error;
use crate::headers::standard::{
    AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, PROXY_AUTHORIZATION,
    USER_AGENT,
};
use crate::headers::{HeaderMap, HeaderValue, IntoHeaderName};
use crate::http::{Method, Target};
use crate::log::debug;
use crate::proto::{content_length, encode_head};
use crate::response::{Head, Response, ResponseFuture};

// ===== Options =====

/// Options of a single request.
///
/// Unset values fall back to the [`EndpointConfig`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Request path, relative to the endpoint root.
    pub path: Option<String>,
    /// Query fields, form encoded in given order.
    pub query: Vec<(String, String)>,
    /// Headers, overriding endpoint headers of the same name.
    pub headers: HeaderMap,
    pub body: Payload,
    pub keepalive: Option<bool>,
    /// Allow sending this request before responses of previous ones arrive.
    pub pipeline: bool,
    pub credentials: Option<Credentials>,
    /// Deliver the response body as [`BodyStream`] instead of buffering it.
    pub streaming: bool,
}

impl RequestOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Append a query field.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a header.
    pub fn header<K: IntoHeaderName, V: Into<HeaderValue>>(mut self, name: K, value: V) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = body.into();
        self
    }

    pub fn keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    pub fn pipeline(mut self, pipeline: bool) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

// ===== Interceptor =====

/// Request representation before serialization.
#[derive(Debug)]
pub struct Parts {
    pub method: Method,
    /// Path and query, starts with `/`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Payload,
}

/// Transformation applied to every request of an endpoint.
///
/// Interceptors run in configured order, after default headers are injected, and before
/// `Content-Length` is computed. Returning an error fails the request with [`Error::Intercept`].
pub trait RequestInterceptor {
    fn transform(&self, parts: Parts) -> Result<Parts, String>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(Parts) -> Result<Parts, String>,
{
    #[inline]
    fn transform(&self, parts: Parts) -> Result<Parts, String> {
        self(parts)
    }
}

// ===== Request =====

/// Lifecycle phase of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Queued,
    AwaitingResponse,
    /// A challenge was answered, waiting to be sent again.
    AuthRetrying,
}

/// Outcome of a complete response message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The request is settled.
    Done,
    /// The request must be sent again with a new `Authorization`.
    Retry,
}

#[derive(Debug)]
struct Received {
    head: Head,
    cookies: HashMap<String, String>,
    body: BytesMut,
    /// `false` for a `401` that is going to be answered.
    forward: bool,
}

/// A single call, from build until its future is settled.
#[derive(Debug)]
pub(crate) struct Request {
    method: Method,
    /// Request URL, its path is the `Request-URI`.
    uri: Target,
    /// Request line target, absolute form through a plain proxy.
    request_target: String,
    headers: HeaderMap,
    /// Caller supplied `Cookie` value, merged with the jar when written.
    cookie: Option<String>,
    body: WireBody,
    keepalive: bool,
    pipeline: bool,
    auth: Option<AuthSession>,
    authorization: Option<HeaderValue>,
    phase: Phase,
    received: Option<Received>,
    tx: Option<oneshot::Sender<Result<Response, Error>>>,
    stream: Option<UnboundedSender<Frame>>,
}

impl Request {
    /// Build a request.
    pub(crate) fn new(
        config: &EndpointConfig,
        target: &Target,
        method: Method,
        options: RequestOptions,
    ) -> Result<(Request, ResponseFuture), Error> {
        let RequestOptions {
            path,
            query,
            headers: call_headers,
            body,
            keepalive,
            pipeline,
            credentials,
            streaming,
        } = options;

        let path = resolve_path(path.as_deref().unwrap_or(&config.path), &query)?;
        let keepalive = keepalive.unwrap_or(config.keepalive);

        let mut headers = config.headers.clone();
        headers.extend_overriding(&call_headers);

        if !headers.contains_key(HOST) {
            headers.insert(HOST, HeaderValue::from_string(target.host_header()));
        }
        match headers.get(USER_AGENT) {
            Some(agent) if agent.is_empty() => {
                headers.remove(USER_AGENT);
            }
            Some(_) => {}
            None if !config.user_agent.is_empty() => {
                headers.insert(USER_AGENT, HeaderValue::from_string(config.user_agent.clone()));
            }
            None => {}
        }
        if !keepalive {
            headers.insert(CONNECTION, "close");
        }

        let mut parts = Parts { method, path, headers, body };
        for interceptor in &config.interceptors {
            parts = interceptor.transform(parts).map_err(Error::Intercept)?;
        }
        let Parts { method, path, mut headers, body } = parts;
        validate_path(&path)?;

        let body = match body {
            Payload::Empty => {
                if method.announces_empty_body() {
                    headers.insert(CONTENT_LENGTH, "0");
                }
                WireBody::Empty
            }
            Payload::Bytes(bytes) => {
                headers.insert(CONTENT_LENGTH, content_length(bytes.len() as u64));
                WireBody::Bytes(bytes)
            }
            Payload::Form(fields) => {
                let encoded = serde_urlencoded::to_string(&fields)
                    .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, err)))?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, "application/x-www-form-urlencoded");
                }
                headers.insert(CONTENT_LENGTH, content_length(encoded.len() as u64));
                WireBody::Bytes(encoded.into())
            }
            // length is resolved by `prepare`
            Payload::File(file) => WireBody::File(file),
        };

        let cookie = take_cookie(&mut headers);

        let request_target = match &config.proxy {
            Some(proxy) if !target.is_tls() => {
                if let Some(auth) = proxy.authorization() {
                    if !headers.contains_key(PROXY_AUTHORIZATION) {
                        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_string(auth));
                    }
                }
                target.url(&path)
            }
            _ => path.clone(),
        };

        let auth = credentials.map(AuthSession::new);
        let authorization = auth
            .as_ref()
            .and_then(AuthSession::initial)
            .map(HeaderValue::from_string);

        let (tx, rx) = oneshot::channel();
        let (stream_tx, stream) = match streaming {
            true => {
                let (tx, stream) = BodyStream::channel();
                (Some(tx), Some(stream))
            }
            false => (None, None),
        };

        let request = Request {
            method,
            uri: target.with_path(path),
            request_target,
            headers,
            cookie,
            body,
            keepalive,
            pipeline,
            auth,
            authorization,
            phase: Phase::Queued,
            received: None,
            tx: Some(tx),
            stream: stream_tx,
        };
        Ok((request, ResponseFuture::new(rx, stream)))
    }

    #[inline]
    pub(crate) fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub(crate) fn uri(&self) -> &Target {
        &self.uri
    }

    #[inline]
    pub(crate) fn keepalive(&self) -> bool {
        self.keepalive
    }

    #[inline]
    pub(crate) fn pipeline(&self) -> bool {
        self.pipeline
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Resolve the `Content-Length` of a file body.
    pub(crate) async fn prepare(&mut self) -> Result<(), Error> {
        if let WireBody::File(path) = &self.body {
            let len = tokio::fs::metadata(path).await?.len();
            self.headers.insert(CONTENT_LENGTH, content_length(len));
        }
        Ok(())
    }

    /// Serialize the header block, with the current cookies and `Authorization`.
    ///
    /// Marks the request as awaiting its response.
    pub(crate) fn encode(&mut self, jar: &CookieJar) -> (Bytes, WireBody) {
        let mut headers = self.headers.clone();

        let stored = jar.with(|store| store.header_value(&self.uri, SystemTime::now()));
        if let Some(cookie) = merge_cookies(self.cookie.as_deref(), stored.as_deref()) {
            headers.insert(COOKIE, HeaderValue::from_string(cookie));
        }
        if let Some(auth) = &self.authorization {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        if !self.keepalive && self.wants_keep_alive() {
            headers.remove(CONNECTION);
        }

        self.phase = Phase::AwaitingResponse;
        self.received = None;
        (encode_head(self.method, &self.request_target, &headers), self.body.clone())
    }

    /// Response head arrived.
    pub(crate) fn on_head(&mut self, head: Head, cookies: HashMap<String, String>) {
        let retry = head.status == 401 && self.auth.as_ref().is_some_and(AuthSession::can_retry);
        if !retry {
            if let Some(stream) = &self.stream {
                let _ = stream.send(Frame::Head(head.clone()));
            }
        }
        self.received = Some(Received {
            head,
            cookies,
            body: BytesMut::new(),
            forward: !retry,
        });
    }

    /// A chunk of the response body arrived.
    pub(crate) fn on_data(&mut self, data: Bytes) {
        let Some(received) = &mut self.received else {
            return;
        };
        if !received.forward {
            return;
        }
        match &self.stream {
            Some(stream) => {
                let _ = stream.send(Frame::Data(data));
            }
            None => received.body.extend_from_slice(&data),
        }
    }

    /// Returns `true` if the received response allows the connection to be reused.
    pub(crate) fn response_keep_alive(&self) -> bool {
        self.wants_keep_alive() && self.received.as_ref().is_some_and(|e| e.head.keep_alive)
    }

    /// Keep-alive of the next attempt, an unfinished NTLM handshake holds the connection.
    fn wants_keep_alive(&self) -> bool {
        self.keepalive || self.auth.as_ref().is_some_and(AuthSession::holds_connection)
    }

    /// Response message is complete.
    pub(crate) fn resolve(&mut self) -> Resolved {
        let Some(received) = self.received.take() else {
            self.settle(Err(Error::PartialResponse));
            return Resolved::Done;
        };

        if !received.forward {
            if let Some(auth) = &mut self.auth {
                let challenges = &received.head.challenges;
                match auth.respond(challenges, self.method, self.uri.path()) {
                    Ok(value) => {
                        debug!("retrying {} {} with credentials", self.method, self.uri.path());
                        self.authorization = Some(HeaderValue::from_string(value));
                        self.phase = Phase::AuthRetrying;
                        return Resolved::Retry;
                    }
                    Err(err) => {
                        self.settle(Err(err.into()));
                        return Resolved::Done;
                    }
                }
            }
        }

        let response = Response::new(received.head, received.body.freeze(), received.cookies);
        self.settle(Ok(response));
        Resolved::Done
    }

    /// Reject the request.
    #[inline]
    pub(crate) fn fail(&mut self, err: Error) {
        self.settle(Err(err));
    }

    /// Deliver the outcome, subsequent calls are ignored.
    fn settle(&mut self, result: Result<Response, Error>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
        self.stream = None;
    }
}

fn resolve_path(path: &str, query: &[(String, String)]) -> Result<String, Error> {
    let mut out = match path.starts_with('/') {
        true => path.to_owned(),
        false => format!("/{path}"),
    };
    if !query.is_empty() {
        let encoded =
            serde_urlencoded::to_string(query).map_err(|err| Error::InvalidUrl(err.to_string()))?;
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(&encoded);
    }
    Ok(out)
}

fn validate_path(path: &str) -> Result<(), Error> {
    let valid = path.starts_with('/')
        && !path.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control());
    match valid {
        true => Ok(()),
        false => Err(Error::InvalidUrl(format!("invalid request path {path:?}"))),
    }
}

/// Remove every `Cookie` field, joining their values.
fn take_cookie(headers: &mut HeaderMap) -> Option<String> {
    let values = headers
        .get_all(COOKIE)
        .map(|e| e.as_str_lossy().into_owned())
        .collect::<Vec<_>>();
    headers.remove(COOKIE);
    (!values.is_empty()).then(|| values.join("; "))
}

/// Join cookie lists, a name already present is skipped.
fn merge_cookies(caller: Option<&str>, stored: Option<&str>) -> Option<String> {
    fn name(pair: &str) -> &str {
        pair.split_once('=').map_or(pair, |(name, _)| name).trim()
    }

    let mut pairs = Vec::<&str>::new();
    for pair in caller.into_iter().chain(stored).flat_map(|e| e.split(';')) {
        let pair = pair.trim();
        if pair.is_empty() || pairs.iter().any(|e| name(e) == name(pair)) {
            continue;
        }
        pairs.push(pair);
    }
    (!pairs.is_empty()).then(|| pairs.join("; "))
}
