//! HTTP Header Multimap.
mod name;
mod value;
mod map;
mod error;

pub use name::{HeaderName, AsHeaderName, IntoHeaderName, standard};
pub use value::HeaderValue;
pub use map::{HeaderMap, HeaderField};
pub use error::HeaderError;

pub(crate) use name::is_token;
