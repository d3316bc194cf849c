//! Foreign endpoint field-write capability: lets `accept`/`copy_to` install
//! an accepted or transferred connection's `{fd, local_port, address,
//! port}` into an endpoint type this crate has never seen.
//!
//! Same-concrete-type transfers bypass this trait entirely and write the
//! fields directly under the target's state-lock (see
//! `Endpoint::accept`/`Endpoint::copy_to`); this trait only exists for a
//! caller-provided endpoint type this crate has never seen.

use std::net::SocketAddr;
use std::os::unix::io::RawFd;

/// The four boundary fields a foreign endpoint must accept.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryFields {
    pub fd: RawFd,
    pub local_port: u16,
    pub remote_address: SocketAddr,
    pub remote_port: u16,
}

/// Implemented by a caller's own endpoint type so `Endpoint::accept`/
/// `copy_to` can install an accepted or transferred connection into it
/// without this crate knowing its concrete type.
pub trait ForeignEndpoint {
    fn install_boundary_fields(&mut self, fields: BoundaryFields);
}
