//! `SocketAddr` <-> `sockaddr` conversions.
//!
//! Lifted from mio's `sys/unix/net.rs`: the kernel adapter needs raw
//! `sockaddr` pointers for `bind`/`connect`/`accept`, the rest of the
//! crate only ever touches `std::net::SocketAddr`.

use std::io;
use std::mem::{self, MaybeUninit};
use std::net::SocketAddr;

pub(crate) fn to_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let raw = &mut storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*raw).sin_family = libc::AF_INET as libc::sa_family_t;
                (*raw).sin_port = v4.port().to_be();
                (*raw).sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            }
            mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let raw = &mut storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*raw).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*raw).sin6_port = v6.port().to_be();
                (*raw).sin6_addr.s6_addr = v6.ip().octets();
                (*raw).sin6_flowinfo = v6.flowinfo();
                (*raw).sin6_scope_id = v6.scope_id();
            }
            mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

/// `storage` must have been populated by a successful `getsockname`,
/// `getpeername`, or `accept`.
pub(crate) unsafe fn from_sockaddr(
    storage: *const libc::sockaddr_storage,
) -> io::Result<SocketAddr> {
    match (*storage).ss_family as libc::c_int {
        libc::AF_INET => {
            let raw = &*(storage as *const libc::sockaddr_in);
            Ok(SocketAddr::V4(std::net::SocketAddrV4::new(
                std::net::Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(raw.sin_port),
            )))
        }
        libc::AF_INET6 => {
            let raw = &*(storage as *const libc::sockaddr_in6);
            Ok(SocketAddr::V6(std::net::SocketAddrV6::new(
                std::net::Ipv6Addr::from(raw.sin6_addr.s6_addr),
                u16::from_be(raw.sin6_port),
                raw.sin6_flowinfo,
                raw.sin6_scope_id,
            )))
        }
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown address family")),
    }
}

pub(crate) fn storage_new() -> MaybeUninit<libc::sockaddr_storage> {
    MaybeUninit::zeroed()
}
