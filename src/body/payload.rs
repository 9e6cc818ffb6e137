use bytes::Bytes;
use std::path::PathBuf;

/// Request message body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes sent as is.
    Bytes(Bytes),
    /// Form fields, sent `application/x-www-form-urlencoded` in given order.
    Form(Vec<(String, String)>),
    /// File streamed after the header block.
    File(PathBuf),
}

impl Payload {
    /// Create form payload.
    pub fn form<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Create file payload.
    #[inline]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Returns `true` if there is no body.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<Bytes> for Payload {
    #[inline]
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<String> for Payload {
    #[inline]
    fn from(value: String) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<&'static str> for Payload {
    #[inline]
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

/// Serialized request body, ready to be written after the header block.
#[derive(Clone, Debug)]
pub(crate) enum WireBody {
    Empty,
    Bytes(Bytes),
    File(PathBuf),
}
