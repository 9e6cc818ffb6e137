use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::headers::HeaderMap;
use crate::request::RequestInterceptor;

/// Endpoint configuration.
///
/// Values here are defaults for every request, [`RequestOptions`] of a single call override them.
///
/// [`RequestOptions`]: crate::request::RequestOptions
#[derive(Clone)]
pub struct EndpointConfig {
    /// Maximum time without traffic on a connection, also bounds connection attempts.
    pub inactivity_timeout: Duration,
    /// Whether requests keep the connection open by default.
    pub keepalive: bool,
    /// Request path used when a call does not give one.
    pub path: String,
    /// Headers sent with every request.
    pub headers: HeaderMap,
    /// Default `User-Agent`, empty to omit the header.
    pub user_agent: String,
    /// Maximum number of in-flight requests when pipelining.
    pub pipeline_limit: usize,
    pub proxy: Option<ProxyConfig>,
    /// TLS client configuration, trusting `webpki-roots` when `None`.
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Applied in order to every request before serialization.
    pub interceptors: Vec<Rc<dyn RequestInterceptor>>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(10),
            keepalive: true,
            path: "/".to_owned(),
            headers: HeaderMap::new(),
            user_agent: "tether".to_owned(),
            pipeline_limit: 8,
            proxy: None,
            tls: None,
            interceptors: Vec::new(),
        }
    }
}

impl EndpointConfig {
    /// Append a request interceptor.
    pub fn intercept<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Rc::new(interceptor));
        self
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("keepalive", &self.keepalive)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("user_agent", &self.user_agent)
            .field("pipeline_limit", &self.pipeline_limit)
            .field("proxy", &self.proxy)
            .field("tls", &self.tls.is_some())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

/// HTTP proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Set proxy credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `Proxy-Authorization` value, if credentials are configured.
    pub(crate) fn authorization(&self) -> Option<String> {
        let username = self.username.as_deref()?;
        let password = self.password.as_deref().unwrap_or_default();
        Some(format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))))
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
