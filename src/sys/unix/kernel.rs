//! Kernel I/O adapter: thin, synchronous wrappers over non-blocking
//! `socket/bind/listen/connect/accept/read/write/shutdown/close/
//! getsockopt/setsockopt`. Every fallible call returns `io::Result<T>`;
//! the would-block loop in `endpoint.rs` is the only place that
//! interprets `EAGAIN`/`EINTR` as control flow rather than an error.
//!
//! Grounded on mio's `sys/unix/socket.rs`: same `syscall!` helper, same
//! pattern of creating sockets with `SOCK_NONBLOCK | SOCK_CLOEXEC` where
//! the platform has it. Unlike mio, `create_socket` here is deliberately
//! *not* non-blocking by default; `Endpoint::create` allocates `fd` in
//! blocking mode, and only the first timeout-bearing operation flips it.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

use super::addr;

/// Helper macro to execute a libc call that returns `-1` on error.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Outcome of a non-blocking byte-stream syscall.
#[derive(Debug)]
pub enum IoOutcome<T> {
    Progress(T),
    Unavailable,
    Interrupted,
    Eof,
}

fn classify_err<T>(err: io::Error) -> io::Result<IoOutcome<T>> {
    match err.raw_os_error() {
        Some(libc::EAGAIN) => Ok(IoOutcome::Unavailable),
        #[allow(unreachable_patterns)]
        Some(libc::EWOULDBLOCK) => Ok(IoOutcome::Unavailable),
        Some(libc::EINTR) => Ok(IoOutcome::Interrupted),
        Some(libc::EINPROGRESS) => Ok(IoOutcome::Unavailable),
        _ => Err(err),
    }
}

pub fn create_socket(addr_is_v6: bool, stream: bool) -> io::Result<RawFd> {
    let domain = if addr_is_v6 { libc::AF_INET6 } else { libc::AF_INET };
    let ty = if stream { libc::SOCK_STREAM } else { libc::SOCK_DGRAM };
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let ty = ty | libc::SOCK_CLOEXEC;
    let fd = syscall!(socket(domain, ty, 0))?;
    Ok(fd)
}

pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    syscall!(fcntl(fd, libc::F_SETFL, new_flags))?;
    Ok(())
}

pub fn bind(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let (storage, len) = addr::to_sockaddr(&addr);
    syscall!(bind(fd, &storage as *const _ as *const libc::sockaddr, len))?;
    Ok(())
}

pub fn listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    syscall!(listen(fd, backlog))?;
    Ok(())
}

/// Issues a non-blocking `connect`. `EINPROGRESS` is reported as
/// `Unavailable` so the caller's would-block loop parks on `POLLOUT`.
pub fn connect(fd: RawFd, addr: SocketAddr) -> io::Result<IoOutcome<()>> {
    let (storage, len) = addr::to_sockaddr(&addr);
    match syscall!(connect(fd, &storage as *const _ as *const libc::sockaddr, len)) {
        Ok(_) => Ok(IoOutcome::Progress(())),
        Err(err) => classify_err(err),
    }
}

/// Reads and clears `SO_ERROR`, used once a connecting socket reports
/// writable to learn whether the connect actually succeeded.
pub fn take_socket_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut errno: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_ERROR,
        &mut errno as *mut _ as *mut libc::c_void,
        &mut len,
    ))?;
    if errno == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(errno)))
    }
}

pub fn accept(fd: RawFd) -> io::Result<IoOutcome<(RawFd, SocketAddr)>> {
    let mut storage = addr::storage_new();
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    match syscall!(accept(
        fd,
        storage.as_mut_ptr() as *mut libc::sockaddr,
        &mut len,
    )) {
        Ok(newfd) => {
            let peer = unsafe { addr::from_sockaddr(storage.as_ptr())? };
            Ok(IoOutcome::Progress((newfd, peer)))
        }
        Err(err) => classify_err(err),
    }
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<IoOutcome<usize>> {
    match syscall!(read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())) {
        Ok(0) if !buf.is_empty() => Ok(IoOutcome::Eof),
        Ok(n) => Ok(IoOutcome::Progress(n as usize)),
        Err(err) => classify_err(err),
    }
}

pub fn write(fd: RawFd, buf: &[u8]) -> io::Result<IoOutcome<usize>> {
    match syscall!(write(fd, buf.as_ptr() as *const libc::c_void, buf.len())) {
        Ok(n) => Ok(IoOutcome::Progress(n as usize)),
        Err(err) => classify_err(err),
    }
}

pub fn send_oob(fd: RawFd, byte: u8) -> io::Result<IoOutcome<usize>> {
    let buf = [byte];
    match syscall!(send(
        fd,
        buf.as_ptr() as *const libc::c_void,
        1,
        libc::MSG_OOB,
    )) {
        Ok(n) => Ok(IoOutcome::Progress(n as usize)),
        Err(err) => classify_err(err),
    }
}

pub fn available(fd: RawFd) -> io::Result<usize> {
    let mut n: libc::c_int = 0;
    syscall!(ioctl(fd, libc::FIONREAD, &mut n as *mut libc::c_int))?;
    Ok(n.max(0) as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHow {
    Read,
    Write,
}

pub fn shutdown(fd: RawFd, how: ShutdownHow) -> io::Result<()> {
    let how = match how {
        ShutdownHow::Read => libc::SHUT_RD,
        ShutdownHow::Write => libc::SHUT_WR,
    };
    match syscall!(shutdown(fd, how)) {
        Ok(_) => Ok(()),
        // Already shut down or already disconnected: idempotent no-op.
        Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Platform "preclose": dup `/dev/null` over `fd` so that any syscall
/// still in flight on it (in another thread) fails promptly, without
/// actually reusing the slot for a new allocation yet.
pub fn preclose(fd: RawFd) -> io::Result<()> {
    const DEV_NULL: &[u8] = b"/dev/null\0";
    let devnull = syscall!(open(DEV_NULL.as_ptr() as *const libc::c_char, libc::O_RDWR))?;
    let result = syscall!(dup2(devnull, fd));
    let _ = syscall!(close(devnull));
    result.map(|_| ())
}

pub fn close(fd: RawFd) -> io::Result<()> {
    syscall!(close(fd))?;
    Ok(())
}

pub fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage = addr::storage_new();
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    syscall!(getsockname(
        fd,
        storage.as_mut_ptr() as *mut libc::sockaddr,
        &mut len,
    ))?;
    unsafe { addr::from_sockaddr(storage.as_ptr()) }
}

pub fn peer_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage = addr::storage_new();
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    syscall!(getpeername(
        fd,
        storage.as_mut_ptr() as *mut libc::sockaddr,
        &mut len,
    ))?;
    unsafe { addr::from_sockaddr(storage.as_ptr()) }
}

pub fn get_opt_i32(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<i32> {
    let mut val: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
        fd,
        level,
        name,
        &mut val as *mut _ as *mut libc::c_void,
        &mut len,
    ))?;
    Ok(val)
}

pub fn set_opt_i32(fd: RawFd, level: libc::c_int, name: libc::c_int, val: i32) -> io::Result<()> {
    syscall!(setsockopt(
        fd,
        level,
        name,
        &val as *const _ as *const libc::c_void,
        std::mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))?;
    Ok(())
}

pub fn get_opt_bool(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<bool> {
    Ok(get_opt_i32(fd, level, name)? != 0)
}

pub fn set_opt_bool(fd: RawFd, level: libc::c_int, name: libc::c_int, val: bool) -> io::Result<()> {
    set_opt_i32(fd, level, name, val as i32)
}

pub fn get_linger(fd: RawFd) -> io::Result<Option<i32>> {
    let mut linger = libc::linger { l_onoff: 0, l_linger: 0 };
    let mut len = std::mem::size_of::<libc::linger>() as libc::socklen_t;
    syscall!(getsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_LINGER,
        &mut linger as *mut _ as *mut libc::c_void,
        &mut len,
    ))?;
    if linger.l_onoff == 0 {
        Ok(None)
    } else {
        Ok(Some(linger.l_linger))
    }
}

/// `secs = None` disables linger (mirrors the legacy `-1`/boolean-`false`
/// convention).
pub fn set_linger(fd: RawFd, secs: Option<i32>) -> io::Result<()> {
    let linger = match secs {
        None => libc::linger { l_onoff: 0, l_linger: 0 },
        Some(s) => libc::linger { l_onoff: 1, l_linger: s },
    };
    syscall!(setsockopt(
        fd,
        libc::SOL_SOCKET,
        libc::SO_LINGER,
        &linger as *const _ as *const libc::c_void,
        std::mem::size_of::<libc::linger>() as libc::socklen_t,
    ))?;
    Ok(())
}
