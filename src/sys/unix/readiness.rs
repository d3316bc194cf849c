//! Readiness waiter: parks the calling thread on a descriptor for
//! `POLLIN`/`POLLOUT` with an optional deadline, wakeable by an external
//! preclose on the same descriptor or by a directed signal to the
//! waiter's own native thread.
//!
//! A single `libc::poll(2)` call per invocation, mirroring the shape of
//! mio's `sys/unix/selector/poll.rs` fallback selector (the generic-unix
//! backend mio itself falls back to when epoll/kqueue aren't available).
//! The driver loop in `endpoint.rs` owns the retry/deadline bookkeeping;
//! this module never loops.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Once;
use std::time::Duration;

bitflags::bitflags! {
    /// Mirrors spec's `POLLIN|POLLOUT`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: i16 {
        const READABLE = libc::POLLIN as i16;
        const WRITABLE = libc::POLLOUT as i16;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Interrupted,
}

/// `timeout = None` waits forever.
pub fn wait(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> io::Result<WaitOutcome> {
    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    };
    let mut pfd = libc::pollfd {
        fd,
        events: interest.bits(),
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    match ret {
        -1 => {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                Ok(WaitOutcome::Interrupted)
            } else {
                Err(err)
            }
        }
        0 => Ok(WaitOutcome::TimedOut),
        _ => Ok(WaitOutcome::Ready),
    }
}

/// Native thread identifier recorded in the endpoint's reader/writer thread
/// slots, used by `close`/`shutdown_input`/`shutdown_output` to signal a
/// thread that is mid-syscall or mid-`wait` on this endpoint's `fd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHandle(libc::pthread_t);

impl ThreadHandle {
    pub fn current() -> ThreadHandle {
        ThreadHandle(unsafe { libc::pthread_self() })
    }

    /// Sends the wakeup signal to this thread. A no-op handler for the
    /// signal is installed once per process by `ensure_wake_signal_installed`;
    /// callers must have called that before any thread can usefully be
    /// signalled (`Endpoint::new` does this on construction, see
    /// `endpoint.rs`).
    pub fn signal_wake(&self) {
        unsafe {
            libc::pthread_kill(self.0, wake_signal());
        }
    }
}

static INSTALL_HANDLER: Once = Once::new();

/// A dedicated real-time signal, not `SIGUSR1`/`SIGUSR2`, so installing
/// this handler can't collide with a signal the embedding application
/// already uses. `SIGRTMIN` is a libc *function* on Linux (the kernel
/// reserves the bottom handful of realtime signals for libc/pthread
/// internals, so the usable range starts at a runtime-computed value).
fn wake_signal() -> libc::c_int {
    unsafe { libc::SIGRTMIN() }
}

extern "C" fn noop_handler(_signum: libc::c_int) {}

/// Installs a no-op handler for the wake signal, without `SA_RESTART` so
/// that a blocking `poll`/`read`/`write`/`accept`/`connect` interrupted by
/// it returns `EINTR` instead of being transparently retried by libc.
pub fn ensure_wake_signal_installed() {
    INSTALL_HANDLER.call_once(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = noop_handler as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;
        libc::sigaction(wake_signal(), &action, std::ptr::null_mut());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn wait_times_out_on_idle_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let outcome = wait(
            listener.as_raw_fd(),
            Interest::READABLE,
            Some(Duration::from_millis(20)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_is_ready_immediately_when_writable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = std::net::TcpStream::connect(addr).unwrap();
        let outcome = wait(listener.as_raw_fd(), Interest::READABLE, None).unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
    }
}
