//! Socket-option surface: the enum plus pure validation. The actual
//! get/set orchestration lives on `Endpoint` (`endpoint.rs`) because
//! several options read/write state-lock-guarded fields (`timeout_millis`,
//! `reuse_address`, `traffic_class`) rather than the kernel.

use crate::error::{Result, SocketError};

/// The legacy integer option identifiers this endpoint surface supports,
/// minus `SO_BINDADDR`, which is read-only and exposed only through
/// `Endpoint::local_addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    Linger,
    Timeout,
    ReuseAddress,
    ReusePort,
    SendBuffer,
    ReceiveBuffer,
    KeepAlive,
    OobInline,
    Tos,
    NoDelay,
}

pub const SUPPORTED_OPTIONS: &[SocketOption] = &[
    SocketOption::Linger,
    SocketOption::Timeout,
    SocketOption::ReuseAddress,
    SocketOption::ReusePort,
    SocketOption::SendBuffer,
    SocketOption::ReceiveBuffer,
    SocketOption::KeepAlive,
    SocketOption::OobInline,
    SocketOption::Tos,
    SocketOption::NoDelay,
];

/// The value carried by a `getOption`/`setOption` call. Kept as one enum
/// (rather than `Box<dyn Any>`) since the option set is closed and small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    /// `None` means linger disabled (`-1`/`false` in the legacy API).
    Linger(Option<i32>),
    TimeoutMillis(u64),
    Bool(bool),
    Int(i32),
}

impl OptionValue {
    pub fn as_bool(self) -> Result<bool> {
        match self {
            OptionValue::Bool(b) => Ok(b),
            _ => Err(SocketError::BadArgument("expected a boolean value".into())),
        }
    }

    pub fn as_int(self) -> Result<i32> {
        match self {
            OptionValue::Int(n) => Ok(n),
            _ => Err(SocketError::BadArgument("expected an integer value".into())),
        }
    }

    pub fn as_timeout_millis(self) -> Result<u64> {
        match self {
            OptionValue::TimeoutMillis(ms) => Ok(ms),
            _ => Err(SocketError::BadArgument("expected a timeout in milliseconds".into())),
        }
    }

    /// `None` (linger disabled) is always accepted; `Some(seconds)` with a
    /// negative duration is rejected rather than silently passed through
    /// to the kernel (disabling is expressed by `None`, not by a negative
    /// `Some`).
    pub fn as_linger(self) -> Result<Option<i32>> {
        match self {
            OptionValue::Linger(Some(seconds)) if seconds < 0 => Err(SocketError::BadArgument(
                format!("SO_LINGER seconds must be >= 0, got {seconds}"),
            )),
            OptionValue::Linger(v) => Ok(v),
            _ => Err(SocketError::BadArgument("expected a linger value".into())),
        }
    }
}

/// Rejects a negative `SO_TIMEOUT`. `u64` already can't go negative, so
/// this validates the signed input a caller would naturally have
/// (milliseconds from a `Duration`-less legacy API) before it's converted.
pub fn validate_timeout_millis(millis: i64) -> Result<u64> {
    if millis < 0 {
        return Err(SocketError::BadArgument(format!("SO_TIMEOUT must be >= 0, got {millis}")));
    }
    Ok(millis as u64)
}

/// `-1` (or any negative value) means linger disabled.
pub fn validate_linger_seconds(seconds: i32) -> Result<Option<i32>> {
    if seconds < 0 {
        Ok(None)
    } else {
        Ok(Some(seconds))
    }
}

/// `SO_SNDBUF`/`SO_RCVBUF` must be `> 0`.
pub fn validate_buffer_size(size: i32) -> Result<i32> {
    if size <= 0 {
        return Err(SocketError::BadArgument(format!("buffer size must be > 0, got {size}")));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_timeout_rejected() {
        assert!(validate_timeout_millis(-1).is_err());
        assert!(validate_timeout_millis(0).is_ok());
    }

    #[test]
    fn negative_linger_means_disabled() {
        assert_eq!(validate_linger_seconds(-1).unwrap(), None);
        assert_eq!(validate_linger_seconds(5).unwrap(), Some(5));
    }

    #[test]
    fn negative_linger_seconds_rejected_once_resolved_to_some() {
        assert!(OptionValue::Linger(Some(-5)).as_linger().is_err());
        assert_eq!(OptionValue::Linger(None).as_linger().unwrap(), None);
        assert_eq!(OptionValue::Linger(Some(5)).as_linger().unwrap(), Some(5));
    }

    #[test]
    fn non_positive_buffer_size_rejected() {
        assert!(validate_buffer_size(0).is_err());
        assert!(validate_buffer_size(-1).is_err());
        assert!(validate_buffer_size(1).is_ok());
    }
}
