use std::io;

use crate::auth::AuthError;
use crate::proto::ParseError;

/// Request failure.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request cancelled")]
    Cancelled,
    #[error("connection closed before the response was received")]
    Disconnected,
    #[error("inactivity timeout")]
    Timeout,
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("connection closed in the middle of the response")]
    PartialResponse,
    #[error("connection reset by peer")]
    Reset,
    #[error("invalid response: {0}")]
    Parse(#[from] ParseError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request interceptor failed: {0}")]
    Intercept(String),
}

impl Error {
    /// Returns `true` for transport level failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Disconnected
                | Self::Timeout
                | Self::ConnectionRefused(_)
                | Self::ConnectionFailure(_)
                | Self::Reset
        )
    }
}

/// Reason a connection was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection.
    Eof,
    /// Peer reset the connection.
    Reset,
    /// Connection attempt was refused.
    Refused(String),
    /// Connection attempt failed, e.g: DNS, TLS handshake or proxy tunnel.
    Failure(String),
    /// IO error on an established connection.
    Io(io::ErrorKind, String),
    /// Closed by the endpoint.
    Local,
}

impl CloseReason {
    /// Classify an io error of an established connection.
    pub(crate) fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => Self::Reset,
            io::ErrorKind::UnexpectedEof => Self::Eof,
            kind => Self::Io(kind, err.to_string()),
        }
    }

    /// Classify an io error of a connection attempt.
    pub(crate) fn from_connect(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused(err.to_string()),
            _ => Self::Failure(err.to_string()),
        }
    }

    /// Error delivered to a request affected by this close.
    pub(crate) fn to_error(&self) -> Error {
        match self {
            Self::Eof | Self::Local => Error::Disconnected,
            Self::Reset => Error::Reset,
            Self::Refused(msg) => Error::ConnectionRefused(msg.clone()),
            Self::Failure(msg) => Error::ConnectionFailure(msg.clone()),
            Self::Io(kind, msg) => Error::Io(io::Error::new(*kind, msg.clone())),
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => f.write_str("closed by peer"),
            Self::Reset => f.write_str("reset by peer"),
            Self::Refused(msg) => write!(f, "refused: {msg}"),
            Self::Failure(msg) => write!(f, "failed: {msg}"),
            Self::Io(_, msg) => write!(f, "io error: {msg}"),
            Self::Local => f.write_str("closed locally"),
        }
    }
}
