//! Error taxonomy for the endpoint surface.
//!
//! `std::io::Error` alone can't distinguish a sticky `ConnectionReset` from
//! a one-off I/O error, or carry the "unknown host" / "unsupported option"
//! kinds the endpoint contract needs. `SocketError` gives each kind its own
//! variant while still converting cleanly to and from `io::Error` so the
//! stream views (see `stream.rs`) can satisfy `std::io::Read`/`Write`.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocketError>;

/// The error kinds this endpoint surface can raise, one variant each.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket closed")]
    Closed,

    #[error("socket is not open")]
    NotOpen,

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection already in progress")]
    ConnectionInProgress,

    #[error("socket is not bound")]
    NotBound,

    #[error("not a stream socket")]
    NotStream,

    #[error("unknown host: {0}")]
    UnresolvedHost(String),

    #[error("bad address: {0}")]
    BadAddress(String),

    #[error("connect timed out to {addr}")]
    ConnectTimeout { addr: SocketAddr },

    #[error("{op} timed out")]
    Timeout { op: &'static str },

    #[error("connection reset")]
    ConnectionReset,

    #[error("{0}")]
    Io(#[source] io::Error),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl SocketError {
    /// Wrap a connect-time I/O failure, decorated with the target address:
    /// a failed `connect` triggers a full close, and the error surfaced to
    /// the caller names what it was trying to reach.
    pub fn connect_failed(addr: SocketAddr, err: io::Error) -> SocketError {
        SocketError::Io(io::Error::new(
            err.kind(),
            format!("connect to {addr} failed: {err}"),
        ))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SocketError::Timeout { .. } | SocketError::ConnectTimeout { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SocketError::Closed | SocketError::NotOpen)
    }
}

impl From<io::Error> for SocketError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => SocketError::ConnectionReset,
            io::ErrorKind::TimedOut => SocketError::Timeout { op: "io" },
            io::ErrorKind::NotConnected => SocketError::NotConnected,
            _ => SocketError::Io(err),
        }
    }
}

/// The stream views need `std::io::{Read, Write}`, which bottom out in
/// `io::Result`. Converting back loses kind granularity for the variants
/// `io::ErrorKind` has no room for, so those fall back to `Other`.
impl From<SocketError> for io::Error {
    fn from(err: SocketError) -> Self {
        match err {
            SocketError::Closed | SocketError::NotOpen => {
                io::Error::new(io::ErrorKind::NotConnected, err.to_string())
            }
            SocketError::ConnectionReset => {
                io::Error::new(io::ErrorKind::ConnectionReset, err.to_string())
            }
            SocketError::Timeout { .. } | SocketError::ConnectTimeout { .. } => {
                io::Error::new(io::ErrorKind::TimedOut, err.to_string())
            }
            SocketError::NotConnected => {
                io::Error::new(io::ErrorKind::NotConnected, err.to_string())
            }
            SocketError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_roundtrips_through_kind() {
        let err = SocketError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, SocketError::ConnectionReset));
    }

    #[test]
    fn closed_is_closed() {
        assert!(SocketError::Closed.is_closed());
        assert!(SocketError::NotOpen.is_closed());
        assert!(!SocketError::NotConnected.is_closed());
    }

    #[test]
    fn timeout_converts_to_io_timed_out() {
        let io_err: io::Error = SocketError::Timeout { op: "read" }.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
    }
}
