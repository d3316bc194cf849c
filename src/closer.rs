//! Descriptor closer: a one-shot object holding `(fd, stream)` with a
//! `closed` flag flipped by compare-and-set, guaranteeing exactly one
//! kernel `close` per descriptor over its lifetime.
//!
//! Rust has no phantom-reachability cleaner; `Drop` is the deterministic
//! analogue, guaranteeing the descriptor is closed even if the user drops
//! references without calling `close`. `Endpoint` holds its `Closer` in an
//! `Arc` so `copy_to`/`accept` can hand the same closer state to a fresh
//! owner without risking a double free.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::hooks::ResourceHook;
use crate::sys::unix::kernel;

const ARMED: u8 = 0;
const CLOSED: u8 = 1;
const DISABLED: u8 = 2;

#[derive(Debug)]
pub struct Closer {
    fd: RawFd,
    is_stream: bool,
    state: AtomicU8,
    resource_hook: Option<Arc<dyn ResourceHook>>,
}

impl Closer {
    pub fn new(fd: RawFd, is_stream: bool, resource_hook: Option<Arc<dyn ResourceHook>>) -> Arc<Closer> {
        Arc::new(Closer {
            fd,
            is_stream,
            state: AtomicU8::new(ARMED),
            resource_hook,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Runs the close exactly once. Returns `true` if this call performed
    /// it. Errors from the kernel `close` are logged and swallowed; the
    /// close attempt is still considered done either way.
    pub fn run(&self) -> bool {
        if self
            .state
            .compare_exchange(ARMED, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Err(err) = kernel::close(self.fd) {
                #[cfg(feature = "log")]
                log::warn!("close({}) failed: {err}", self.fd);
                let _ = err;
            }
            if !self.is_stream {
                if let Some(hook) = &self.resource_hook {
                    hook.after_udp_close();
                }
            }
            true
        } else {
            false
        }
    }

    /// Disables the closer without closing `fd`, used when ownership of
    /// `fd` is transferred to another endpoint via `copy_to` or `accept`.
    pub fn disable(&self) {
        let _ = self
            .state
            .compare_exchange(ARMED, DISABLED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_armed(&self) -> bool {
        self.state.load(Ordering::Acquire) == ARMED
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn run_closes_exactly_once() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_raw_fd();
        std::mem::forget(listener); // closer now owns the fd
        let closer = Closer::new(fd, true, None);
        assert!(closer.run());
        assert!(!closer.run());
    }

    #[test]
    fn disable_prevents_close() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_raw_fd();
        let closer = Closer::new(fd, true, None);
        closer.disable();
        assert!(!closer.run());
        // fd is still owned by `listener`, which will close it on drop.
        drop(listener);
    }
}
