//! HTTP endpoint.
//!
//! An [`Endpoint`] is bound to one scheme, host and port, and multiplexes requests over one
//! connection at a time.
use std::rc::Rc;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

use crate::connection::Connector;
use crate::cookie::CookieJar;
use crate::error::Error;
use crate::http::{Method, Target};
use crate::request::{Request, RequestOptions};
use crate::response::ResponseFuture;

mod config;
mod driver;
mod machine;

pub use config::{EndpointConfig, ProxyConfig};
pub(crate) use machine::ConnId;

use driver::{Driver, Message};
use machine::Machine;

/// Client endpoint.
///
/// Handles are cheap to clone. Dropping the last handle cancels every outstanding request.
///
/// Must be created inside a [`LocalSet`][tokio::task::LocalSet].
#[derive(Clone, Debug)]
pub struct Endpoint {
    inner: Rc<Inner>,
}

#[derive(Debug)]
struct Inner {
    target: Target,
    config: EndpointConfig,
    jar: CookieJar,
    tx: UnboundedSender<Message>,
}

impl Endpoint {
    /// Create new [`Endpoint`] for given url, e.g: `https://example.com:8443`.
    ///
    /// The path of `url` is ignored, request paths are taken from [`EndpointConfig::path`] or
    /// [`RequestOptions::path`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a [`LocalSet`][tokio::task::LocalSet].
    pub fn new(url: &str, config: EndpointConfig) -> Result<Endpoint, Error> {
        let target = Target::parse(url).map_err(|err| Error::InvalidUrl(err.to_string()))?;
        let jar = CookieJar::new();

        let connector = Connector::new(target.clone(), config.proxy.clone(), config.tls.clone());
        let machine = Machine::new(jar.clone(), config.pipeline_limit);
        let (driver, events) = Driver::new(machine, connector, config.inactivity_timeout);

        let (tx, rx) = unbounded_channel();
        tokio::task::spawn_local(driver.run(rx, events));

        Ok(Endpoint {
            inner: Rc::new(Inner { target, config, jar, tx }),
        })
    }

    /// Queue a request.
    ///
    /// Never fails synchronously, every failure is delivered through the returned future.
    pub fn request(&self, method: Method, options: RequestOptions) -> ResponseFuture {
        let inner = &*self.inner;
        match Request::new(&inner.config, &inner.target, method, options) {
            Ok((request, future)) => {
                // a closed driver drops the request, the future then resolves `Disconnected`
                let _ = inner.tx.send(Message::Submit(request));
                future
            }
            Err(err) => ResponseFuture::failed(err),
        }
    }

    #[inline]
    pub fn get(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::GET, options)
    }

    #[inline]
    pub fn head(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::HEAD, options)
    }

    #[inline]
    pub fn put(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::PUT, options)
    }

    #[inline]
    pub fn post(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::POST, options)
    }

    #[inline]
    pub fn patch(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::PATCH, options)
    }

    #[inline]
    pub fn delete(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::DELETE, options)
    }

    #[inline]
    pub fn options(&self, options: RequestOptions) -> ResponseFuture {
        self.request(Method::OPTIONS, options)
    }

    /// Reject every queued and in-flight request with [`Error::Cancelled`], and close the
    /// connection.
    pub fn cancel_all(&self) {
        let _ = self.inner.tx.send(Message::CancelAll);
    }

    /// Returns the cookie jar shared by every request of this endpoint.
    #[inline]
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.inner.jar
    }

    /// Returns the endpoint target.
    #[inline]
    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    /// Returns the endpoint configuration.
    #[inline]
    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod test;
