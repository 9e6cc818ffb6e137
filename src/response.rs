//! HTTP Response.
use bytes::Bytes;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Poll, ready};
use tokio::sync::oneshot;

use crate::body::BodyStream;
use crate::error::Error;
use crate::headers::HeaderMap;
use crate::http::Version;

/// Response status line and headers.
#[derive(Clone, Debug)]
pub struct Head {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    /// Every header except `Set-Cookie`, which is consumed by the cookie jar.
    pub headers: HeaderMap,
    /// Whether the connection may be reused after this response.
    pub keep_alive: bool,
    /// Every `WWW-Authenticate` value, in received order.
    pub challenges: Vec<String>,
}

/// A complete HTTP response.
#[derive(Debug)]
pub struct Response {
    head: Head,
    body: Bytes,
    cookies: HashMap<String, String>,
}

impl Response {
    pub(crate) fn new(head: Head, body: Bytes, cookies: HashMap<String, String>) -> Self {
        Self { head, body, cookies }
    }

    /// Returns the status code.
    #[inline]
    pub fn status(&self) -> u16 {
        self.head.status
    }

    /// Returns the reason phrase.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.head.reason
    }

    /// Returns the HTTP version.
    #[inline]
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Returns the headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns `true` if the server allowed the connection to be reused.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.head.keep_alive
    }

    /// Returns the response head.
    #[inline]
    pub fn head(&self) -> &Head {
        &self.head
    }

    /// Returns the body, empty for streaming requests.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as lossy UTF-8.
    #[inline]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Cookies applicable to the request URL once this response was received.
    #[inline]
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Destruct the response into head and body.
    #[inline]
    pub fn into_parts(self) -> (Head, Bytes) {
        (self.head, self.body)
    }
}

/// Future resolved with the final [`Response`] of a request.
///
/// Dropping the future does not cancel the request.
#[derive(Debug)]
pub struct ResponseFuture {
    pub(crate) rx: oneshot::Receiver<Result<Response, Error>>,
    stream: Option<BodyStream>,
}

impl ResponseFuture {
    pub(crate) fn new(
        rx: oneshot::Receiver<Result<Response, Error>>,
        stream: Option<BodyStream>,
    ) -> Self {
        Self { rx, stream }
    }

    /// Future that is already failed.
    pub(crate) fn failed(err: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx, stream: None }
    }

    /// Take the body stream of a streaming request.
    ///
    /// Returns `None` if the request is not streaming, or the stream was already taken.
    #[inline]
    pub fn take_stream(&mut self) -> Option<BodyStream> {
        self.stream.take()
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            // driver is gone without settling
            Err(_) => Poll::Ready(Err(Error::Disconnected)),
        }
    }
}
