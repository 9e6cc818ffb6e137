//! HTTP Body Message.
//!
//! - [`Payload`] request body
//! - [`BodyStream`] streamed response body, yielding [`Frame`]s
//! - [`BodyDecoder`] response body framing
mod chunked;
mod decoder;
mod payload;
mod stream;
pub mod error;

pub use chunked::ChunkedDecoder;
pub use decoder::BodyDecoder;
pub use payload::Payload;
pub use stream::{BodyStream, Frame};

pub(crate) use payload::WireBody;
