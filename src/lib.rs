//! A blocking-socket endpoint built on a non-blocking kernel socket and a
//! `poll(2)`-based readiness waiter.
//!
//! This crate gives callers a traditional blocking `Endpoint` (`connect`,
//! `accept`, `read`, `write`, timeouts, half-shutdown, socket options) while
//! internally driving every operation through a non-blocking file
//! descriptor. A caller that sets a read/write timeout gets exactly that:
//! the calling thread blocks in the kernel until data is ready, the
//! deadline elapses, or another thread closes the endpoint out from under
//! it.
//!
//! ```no_run
//! use sockbridge::{Endpoint, ReadStream, WriteStream};
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//!
//! # fn main() -> sockbridge::Result<()> {
//! let endpoint = Arc::new(Endpoint::with_default_hooks(false));
//! endpoint.create(true)?;
//! // TEST-NET-2 (RFC 5737): reserved for documentation, never routable.
//! endpoint.connect("198.51.100.1:80".parse().unwrap(), 5_000)?;
//!
//! let mut writer = WriteStream::new(endpoint.clone());
//! writer.write_all(b"GET / HTTP/1.0\r\n\r\n").map_err(sockbridge::SocketError::from)?;
//!
//! let mut reader = ReadStream::new(endpoint.clone());
//! let mut response = Vec::new();
//! reader.read_to_end(&mut response).map_err(sockbridge::SocketError::from)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Platform support
//!
//! Unix only. See [`sys`] for why.
//!
//! # Feature flags
//!
//! * `log` (default): emits state transitions and close-path diagnostics
//!   through the [`log`] crate's facade. Disable it in environments that
//!   don't want a logging backend pulled in at all.

#![deny(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod closer;
pub mod endpoint;
pub mod error;
pub mod foreign;
pub mod hooks;
pub mod options;
pub mod state;
pub mod stream;
pub mod sys;

pub use closer::Closer;
pub use endpoint::{Endpoint, EndpointConfig, EndpointHooks, DEFAULT_BACKLOG, MAX_BUFFER_SIZE};
pub use error::{Result, SocketError};
pub use foreign::{BoundaryFields, ForeignEndpoint};
pub use hooks::{PreBindHook, PreConnectHook, ResourceHook};
pub use options::{OptionValue, SocketOption, SUPPORTED_OPTIONS};
pub use state::State;
pub use stream::{ReadStream, WriteStream};
