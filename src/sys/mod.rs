//! Platform backend selection. This crate targets POSIX only: the
//! preclose/thread-signal primitives it relies on (`dup2`-over-fd,
//! `pthread_kill`) are unix-shaped, and a Windows/IOCP backend would need
//! a materially different readiness waiter (mio's own `sys/windows/afd.rs`
//! does this with `NtDeviceIoControlFile`, which has no equivalent narrow
//! slice here). See DESIGN.md.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix as platform;
