//! HTTP/1.x client protocol.
pub mod parser;
mod encode;
mod error;

pub use parser::{Eof, Event, ResponseParser};
pub use encode::{content_length, encode_head};
pub use error::ParseError;
