//! Unix backend: the kernel I/O adapter and the readiness poller, built
//! directly on `libc` in the style of mio's `sys/unix` tree.

pub mod addr;
pub mod kernel;
pub mod readiness;
