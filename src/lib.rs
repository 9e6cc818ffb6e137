//! Asynchronous HTTP/1.1 client endpoint.
//!
//! An [`Endpoint`] keeps one connection to a host, queues requests, pipelines them when allowed,
//! answers Digest and NTLM challenges, and stores cookies.
//!
//! ```no_run
//! use tether::{Endpoint, EndpointConfig, RequestOptions};
//!
//! # async fn app() -> Result<(), tether::Error> {
//! let endpoint = Endpoint::new("http://example.com", EndpointConfig::default())?;
//! let res = endpoint.get(RequestOptions::new().path("/index.html")).await?;
//! println!("{} {}", res.status(), res.text());
//! # Ok(())
//! # }
//! ```
#![warn(missing_debug_implementations)]

mod common;
mod log;

pub mod http;
pub mod headers;
pub mod body;
pub mod proto;
pub mod cookie;
pub mod auth;
pub mod request;
pub mod response;
mod connection;
pub mod endpoint;
pub mod error;

pub use common::ParseResult;
pub use auth::Credentials;
pub use body::{BodyStream, Frame, Payload};
pub use cookie::CookieJar;
pub use endpoint::{Endpoint, EndpointConfig, ProxyConfig};
pub use error::{CloseReason, Error};
pub use http::Method;
pub use request::{Parts, RequestInterceptor, RequestOptions};
pub use response::{Response, ResponseFuture};
