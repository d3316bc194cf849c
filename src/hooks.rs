//! External collaborators injected at construction time rather than
//! reached for as process-wide statics, so the endpoint stays testable
//! without global state.

use std::io;
use std::net::SocketAddr;

/// Datagram create/close accounting hook. Stream endpoints never call this.
pub trait ResourceHook: Send + Sync {
    fn before_udp_create(&self) -> io::Result<()> {
        Ok(())
    }
    fn after_udp_close(&self) {}
}

/// No-op hook used when the embedder doesn't care about datagram
/// accounting.
#[derive(Debug, Default)]
pub struct NullResourceHook;

impl ResourceHook for NullResourceHook {}

/// Platform integration point run before `bind` (transparent-proxy /
/// firewall integration).
pub trait PreBindHook: Send + Sync {
    fn pre_bind(&self, addr: SocketAddr) -> io::Result<()>;
}

/// Platform integration point run before `connect`.
pub trait PreConnectHook: Send + Sync {
    fn pre_connect(&self, addr: SocketAddr) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct NullPreBindHook;

impl PreBindHook for NullPreBindHook {
    fn pre_bind(&self, _addr: SocketAddr) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullPreConnectHook;

impl PreConnectHook for NullPreConnectHook {
    fn pre_connect(&self, _addr: SocketAddr) -> io::Result<()> {
        Ok(())
    }
}
