//! HTTP Protocol primitives.
mod method;
mod version;
mod target;

pub use method::{Method, UnknownMethod};
pub use version::Version;
pub use target::{InvalidTarget, Scheme, Target};
