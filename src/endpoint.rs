//! Endpoint state machine and operation drivers: the hard part of this
//! crate. `Endpoint` is the blocking-socket facade; everything it does
//! eventually bottoms out in `sys::unix::kernel` (the non-blocking
//! syscalls) and `sys::unix::readiness` (the poller), both treated as
//! external collaborators.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::closer::Closer;
use crate::error::{Result, SocketError};
use crate::foreign::{BoundaryFields, ForeignEndpoint};
use crate::hooks::{NullPreBindHook, NullPreConnectHook, NullResourceHook, PreBindHook, PreConnectHook, ResourceHook};
use crate::options::{OptionValue, SocketOption, SUPPORTED_OPTIONS};
use crate::state::{Inner, State, StateLock};
use crate::sys::unix::kernel::{self, IoOutcome, ShutdownHow};
use crate::sys::unix::readiness::{self, Interest, ThreadHandle, WaitOutcome};

/// The bounded per-syscall transfer window.
pub const MAX_BUFFER_SIZE: usize = 131_072;
/// `listen`'s `backlog < 1` clamps to this.
pub const DEFAULT_BACKLOG: i32 = 50;

/// Construction-time collaborators: injected rather than reached for as
/// statics.
pub struct EndpointHooks {
    pub resource: Arc<dyn ResourceHook>,
    pub pre_bind: Arc<dyn PreBindHook>,
    pub pre_connect: Arc<dyn PreConnectHook>,
}

impl Default for EndpointHooks {
    fn default() -> Self {
        EndpointHooks {
            resource: Arc::new(NullResourceHook),
            pre_bind: Arc::new(NullPreBindHook),
            pre_connect: Arc::new(NullPreConnectHook),
        }
    }
}

impl std::fmt::Debug for EndpointHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHooks").finish_non_exhaustive()
    }
}

/// Initial configuration for `Endpoint::new`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointConfig {
    pub server: bool,
    pub initial_timeout_millis: u64,
}

/// A stream-socket endpoint: the blocking facade this crate exposes.
pub struct Endpoint {
    /// Immutable role flag, set once at construction.
    server: bool,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
    state: StateLock,
    /// Lock-free mirror of `state.lock().state`, so `state()` is readable
    /// without locking.
    state_fast: AtomicU8,
    hooks: EndpointHooks,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("server", &self.server)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn new(config: EndpointConfig, hooks: EndpointHooks) -> Endpoint {
        readiness::ensure_wake_signal_installed();
        let ep = Endpoint {
            server: config.server,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            state: StateLock::new(),
            state_fast: AtomicU8::new(State::New as u8),
            hooks,
        };
        ep.state.lock().timeout_millis = config.initial_timeout_millis;
        ep
    }

    pub fn with_default_hooks(server: bool) -> Endpoint {
        Endpoint::new(
            EndpointConfig { server, initial_timeout_millis: 0 },
            EndpointHooks::default(),
        )
    }

    /// Readable without locking the state-lock.
    pub fn state(&self) -> State {
        // SAFETY-by-construction: State is a fieldless enum laid out 0..=5,
        // matching the discriminants written by `set_state`.
        match self.state_fast.load(Ordering::Acquire) {
            0 => State::New,
            1 => State::Unconnected,
            2 => State::Connecting,
            3 => State::Connected,
            4 => State::Closing,
            _ => State::Closed,
        }
    }

    fn set_state(inner: &mut Inner, fast: &AtomicU8, new: State) {
        inner.state = new;
        fast.store(new as u8, Ordering::Release);
        #[cfg(feature = "log")]
        log::debug!("endpoint state -> {new:?}");
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn local_port(&self) -> u16 {
        self.state.lock().local_port
    }

    /// Returns the bind address as the caller supplied it, not the
    /// kernel's `getsockname` resolution: callers depend on seeing
    /// `0.0.0.0` rather than the kernel-reported `::` on a dual-stack
    /// socket. Falls back to `getsockname` for a socket that connected
    /// without an explicit `bind`.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let fd = self.require_fd()?;
        if let Some(addr) = self.state.lock().bound_address {
            return Ok(addr);
        }
        Ok(kernel::local_addr(fd)?)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.lock().remote_address
    }

    fn require_fd(&self) -> Result<RawFd> {
        let inner = self.state.lock();
        if inner.state >= State::Closing {
            return Err(SocketError::Closed);
        }
        inner.fd.ok_or(SocketError::NotOpen)
    }

    // ---- lifecycle operations -----------------------------------------

    /// `create(stream)`: only valid from `NEW`.
    pub fn create(&self, stream: bool) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.state != State::New {
            return Err(SocketError::AlreadyConnected);
        }
        if !stream {
            self.hooks.resource.before_udp_create().map_err(SocketError::from)?;
        }
        let domain_is_v6 = false; // chosen at bind/connect time once the target family is known
        let fd = match kernel::create_socket(domain_is_v6, stream) {
            Ok(fd) => fd,
            Err(err) => {
                if !stream {
                    self.hooks.resource.after_udp_close();
                }
                return Err(err.into());
            }
        };
        inner.fd = Some(fd);
        inner.stream = stream;
        inner.closer = Some(Closer::new(fd, stream, Some(self.hooks.resource.clone())));
        Self::set_state(&mut inner, &self.state_fast, State::Unconnected);
        Ok(())
    }

    /// `bind(host, port)`: requires `state >= UNCONNECTED`, `localport == 0`.
    pub fn bind(&self, addr: SocketAddr) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.state < State::Unconnected || inner.state >= State::Closing {
            return Err(SocketError::NotOpen);
        }
        if inner.local_port != 0 {
            return Err(SocketError::BadArgument("already bound".into()));
        }
        let fd = self.ensure_fd_family(&mut inner, &addr)?;
        self.hooks.pre_bind.pre_bind(addr).map_err(SocketError::from)?;
        kernel::bind(fd, addr)?;
        let bound = kernel::local_addr(fd)?;
        inner.local_port = bound.port();
        inner.bound_address = Some(SocketAddr::new(addr.ip(), bound.port()));
        Ok(())
    }

    /// `create` always allocates an IPv4 socket since the target family
    /// isn't known yet; the first `bind`/`connect` against an IPv6 address
    /// swaps it for one of the right domain. The old fd is still unbound
    /// and unconnected at this point, so nothing is lost by replacing it.
    fn ensure_fd_family(&self, inner: &mut Inner, addr: &SocketAddr) -> Result<RawFd> {
        let want_v6 = addr.is_ipv6();
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        let is_v6 = kernel::local_addr(fd).map(|a| a.is_ipv6()).unwrap_or(false);
        if want_v6 == is_v6 {
            return Ok(fd);
        }
        if let Some(closer) = inner.closer.take() {
            closer.disable();
        }
        let _ = kernel::close(fd);
        let new_fd = kernel::create_socket(want_v6, inner.stream)?;
        inner.fd = Some(new_fd);
        inner.closer = Some(Closer::new(new_fd, inner.stream, Some(self.hooks.resource.clone())));
        Ok(new_fd)
    }

    /// `listen(backlog)`: requires bound; clamps `backlog < 1` to 50.
    pub fn listen(&self, backlog: i32) -> Result<()> {
        let inner = self.state.lock();
        if inner.local_port == 0 {
            return Err(SocketError::NotBound);
        }
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        let backlog = if backlog < 1 { DEFAULT_BACKLOG } else { backlog };
        kernel::listen(fd, backlog)?;
        Ok(())
    }

    /// `connect(addr, millis)`: the single valid entry `UNCONNECTED ->
    /// CONNECTING -> CONNECTED`.
    pub fn connect(&self, addr: SocketAddr, millis: u64) -> Result<()> {
        let addr = resolve_wildcard(addr);
        let _role = self.read_lock.lock();

        let fd = {
            let mut inner = self.state.lock();
            if inner.state != State::Unconnected {
                return Err(SocketError::ConnectionInProgress);
            }
            let fd = if inner.local_port == 0 {
                // Not yet bound: still free to swap families to match the target.
                self.ensure_fd_family(&mut inner, &addr)?
            } else {
                inner.fd.ok_or(SocketError::NotOpen)?
            };
            Self::set_state(&mut inner, &self.state_fast, State::Connecting);
            inner.reader_thread = Some(ThreadHandle::current());
            fd
        };

        let result = self.connect_driver(fd, addr, millis);

        match result {
            Ok(()) => {
                let mut inner = self.state.lock();
                inner.reader_thread = None;
                self.state.notify_drain();
                if inner.state == State::Closing || inner.state == State::Closed {
                    return Err(SocketError::Closed);
                }
                Self::set_state(&mut inner, &self.state_fast, State::Connected);
                inner.remote_address = Some(addr);
                inner.remote_port = addr.port();
                if let Ok(local) = kernel::local_addr(fd) {
                    inner.local_port = local.port();
                }
                Ok(())
            }
            Err(err) => {
                {
                    let mut inner = self.state.lock();
                    inner.reader_thread = None;
                    self.state.notify_drain();
                }
                // Connect reached CONNECTING and then failed: close before
                // surfacing the error.
                #[cfg(feature = "log")]
                log::warn!("connect to {addr} failed, closing endpoint: {err}");
                let _ = self.close();
                Err(match err {
                    SocketError::Closed => SocketError::Closed,
                    SocketError::Timeout { .. } => SocketError::ConnectTimeout { addr },
                    other => SocketError::connect_failed(addr, other.into()),
                })
            }
        }
    }

    fn connect_driver(&self, fd: RawFd, addr: SocketAddr, millis: u64) -> Result<()> {
        if millis > 0 {
            kernel::set_nonblocking(fd, true)?;
            self.state.lock().non_blocking = true;
        }

        self.hooks.pre_connect.pre_connect(addr).map_err(SocketError::from)?;

        let deadline = if millis > 0 {
            Some(Instant::now() + Duration::from_millis(millis))
        } else {
            None
        };

        match kernel::connect(fd, addr)? {
            IoOutcome::Progress(()) => return Ok(()),
            IoOutcome::Unavailable | IoOutcome::Interrupted => {}
            IoOutcome::Eof => unreachable!("connect never reports EOF"),
        }

        loop {
            if !self.is_open() {
                return Err(SocketError::Closed);
            }
            let wait_result = match deadline {
                None => readiness::wait(fd, Interest::WRITABLE, None),
                Some(dl) => {
                    let remaining = dl.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SocketError::Timeout { op: "connect" });
                    }
                    readiness::wait(fd, Interest::WRITABLE, Some(remaining))
                }
            }?;
            if wait_result == WaitOutcome::TimedOut && deadline.is_some() {
                return Err(SocketError::Timeout { op: "connect" });
            }
            if let Some(err) = kernel::take_socket_error(fd)? {
                return Err(err.into());
            }
            // Writable + no pending SO_ERROR: the connect completed.
            return Ok(());
        }
    }

    /// `accept(target)` into a fresh same-type `Endpoint`, already
    /// `CONNECTED`. Requires `state == UNCONNECTED` (or `CONNECTED` for a
    /// listener-as-endpoint), `stream == true`, bound.
    pub fn accept(&self) -> Result<Endpoint> {
        let (new_fd, peer) = self.accept_raw()?;
        let child = Endpoint::with_default_hooks(false);
        {
            let mut inner = child.state.lock();
            inner.fd = Some(new_fd);
            inner.stream = true;
            inner.closer = Some(Closer::new(new_fd, true, Some(self.hooks.resource.clone())));
            inner.remote_address = Some(peer);
            inner.remote_port = peer.port();
            match kernel::local_addr(new_fd) {
                Ok(local) => inner.local_port = local.port(),
                Err(err) => {
                    let _ = kernel::close(new_fd);
                    return Err(err.into());
                }
            }
            Endpoint::set_state(&mut inner, &child.state_fast, State::Connected);
        }
        Ok(child)
    }

    /// Same as `accept`, but installs the accepted connection into a
    /// caller-provided endpoint type this crate has never seen.
    pub fn accept_into_foreign(&self, target: &mut dyn ForeignEndpoint) -> Result<()> {
        let (new_fd, peer) = self.accept_raw()?;
        let local_port = match kernel::local_addr(new_fd) {
            Ok(local) => local.port(),
            Err(err) => {
                let _ = kernel::close(new_fd);
                return Err(err.into());
            }
        };
        target.install_boundary_fields(BoundaryFields {
            fd: new_fd,
            local_port,
            remote_address: peer,
            remote_port: peer.port(),
        });
        Ok(())
    }

    fn accept_raw(&self) -> Result<(RawFd, SocketAddr)> {
        let _role = self.read_lock.lock();

        {
            let inner = self.state.lock();
            if !inner.stream {
                return Err(SocketError::NotStream);
            }
            if inner.local_port == 0 {
                return Err(SocketError::NotBound);
            }
            let ok_state = inner.state == State::Unconnected || inner.state == State::Connected;
            if !ok_state {
                return Err(SocketError::NotOpen);
            }
        }

        let fd = {
            let mut inner = self.state.lock();
            let fd = inner.fd.ok_or(SocketError::NotOpen)?;
            inner.reader_thread = Some(ThreadHandle::current());
            fd
        };

        let timeout_millis = self.state.lock().timeout_millis;
        let result = self.blocking_loop(fd, Interest::READABLE, timeout_millis, "accept", |fd| {
            Ok(kernel::accept(fd)?)
        });

        {
            let mut inner = self.state.lock();
            inner.reader_thread = None;
            self.state.notify_drain();
        }

        result
    }

    /// `read(buf)`: returns `-1` at EOF, matching the legacy
    /// `InputStream`-shaped contract this crate's surface preserves.
    pub fn read(&self, buf: &mut [u8]) -> Result<isize> {
        let _role = self.read_lock.lock();

        let fd = {
            let mut inner = self.state.lock();
            if inner.state >= State::Closing {
                return Err(SocketError::Closed);
            }
            if inner.state != State::Connected {
                return Err(SocketError::NotConnected);
            }
            let fd = inner.fd.ok_or(SocketError::NotOpen)?;
            inner.reader_thread = Some(ThreadHandle::current());
            fd
        };

        let timeout_millis = self.state.lock().timeout_millis;
        let n = buf.len().min(MAX_BUFFER_SIZE);
        let result = self.blocking_loop(fd, Interest::READABLE, timeout_millis, "read", |fd| {
            match kernel::read(fd, &mut buf[..n])? {
                IoOutcome::Progress(k) => Ok(IoOutcome::Progress(k as isize)),
                IoOutcome::Eof => Ok(IoOutcome::Progress(-1)),
                IoOutcome::Unavailable => Ok(IoOutcome::Unavailable),
                IoOutcome::Interrupted => Ok(IoOutcome::Interrupted),
            }
        });

        {
            let mut inner = self.state.lock();
            inner.reader_thread = None;
            self.state.notify_drain();
        }

        result
    }

    /// `write(buf)`: one would-block loop bounded to `MAX_BUFFER_SIZE`
    /// bytes; the full-buffer loop lives in `stream::WriteStream`.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let _role = self.write_lock.lock();

        let fd = {
            let mut inner = self.state.lock();
            if inner.state >= State::Closing {
                return Err(SocketError::Closed);
            }
            if inner.state != State::Connected {
                return Err(SocketError::NotConnected);
            }
            let fd = inner.fd.ok_or(SocketError::NotOpen)?;
            inner.writer_thread = Some(ThreadHandle::current());
            fd
        };

        let timeout_millis = self.state.lock().timeout_millis;
        let n = buf.len().min(MAX_BUFFER_SIZE);
        let result = self.blocking_loop(fd, Interest::WRITABLE, timeout_millis, "write", |fd| {
            match kernel::write(fd, &buf[..n])? {
                IoOutcome::Progress(k) => Ok(IoOutcome::Progress(k)),
                IoOutcome::Eof => unreachable!("write never reports EOF"),
                IoOutcome::Unavailable => Ok(IoOutcome::Unavailable),
                IoOutcome::Interrupted => Ok(IoOutcome::Interrupted),
            }
        });

        {
            let mut inner = self.state.lock();
            inner.writer_thread = None;
            self.state.notify_drain();
        }

        result
    }

    pub fn available(&self) -> Result<usize> {
        let inner = self.state.lock();
        if inner.state != State::Connected || inner.is_input_closed {
            return Ok(0);
        }
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        Ok(kernel::available(fd)?)
    }

    /// `sendUrgentData(b)`: single OOB byte via a retry loop. A would-block
    /// OOB send is reported as unsupported rather than parked on.
    pub fn send_urgent_data(&self, byte: u8) -> Result<()> {
        let _role = self.write_lock.lock();
        let fd = self.require_fd()?;
        match kernel::send_oob(fd, byte)? {
            IoOutcome::Progress(_) => Ok(()),
            IoOutcome::Unavailable => Err(SocketError::Unsupported("OOB send would block")),
            IoOutcome::Interrupted => Err(SocketError::Unsupported("OOB send interrupted")),
            IoOutcome::Eof => unreachable!(),
        }
    }

    pub fn supports_urgent_data(&self) -> bool {
        self.state.lock().stream
    }

    /// `shutdownInput`: idempotent; signals any in-flight reader.
    pub fn shutdown_input(&self) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.state != State::Connected {
            return Err(SocketError::NotConnected);
        }
        if inner.is_input_closed {
            return Ok(());
        }
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        kernel::shutdown(fd, ShutdownHow::Read)?;
        inner.is_input_closed = true;
        if let Some(reader) = inner.reader_thread {
            reader.signal_wake();
        }
        Ok(())
    }

    /// `shutdownOutput`: idempotent; signals any in-flight writer.
    pub fn shutdown_output(&self) -> Result<()> {
        let mut inner = self.state.lock();
        if inner.state != State::Connected {
            return Err(SocketError::NotConnected);
        }
        if inner.is_output_closed {
            return Ok(());
        }
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        kernel::shutdown(fd, ShutdownHow::Write)?;
        inner.is_output_closed = true;
        if let Some(writer) = inner.writer_thread {
            writer.signal_wake();
        }
        Ok(())
    }

    pub fn is_input_closed(&self) -> bool {
        self.state.lock().is_input_closed
    }

    pub fn is_output_closed(&self) -> bool {
        self.state.lock().is_output_closed
    }

    fn is_open(&self) -> bool {
        self.state().is_open()
    }

    // ---- close protocol -------------------------------------------------

    /// The close protocol. Idempotent; may run concurrently with a
    /// blocked read/write/accept/connect on another thread.
    pub fn close(&self) -> Result<()> {
        readiness::ensure_wake_signal_installed();

        let mut inner = self.state.lock();
        if inner.state >= State::Closing {
            return Ok(());
        }
        if inner.state == State::New {
            Self::set_state(&mut inner, &self.state_fast, State::Closed);
            return Ok(());
        }
        Self::set_state(&mut inner, &self.state_fast, State::Closing);

        // Step 2: nudge the peer with a write-side shutdown unless
        // SO_LINGER is enabled. Disabled is the default (no linger
        // tracked => always nudge here; an enabled linger is honoured by
        // the kernel's own close(2) semantics).
        if let Some(fd) = inner.fd {
            if kernel::get_linger(fd).ok().flatten().is_none() {
                let _ = kernel::shutdown(fd, ShutdownHow::Write);
            }
        }

        // Step 3: preclose + signal any in-flight reader/writer.
        let reader = inner.reader_thread;
        let writer = inner.writer_thread;
        if reader.is_some() || writer.is_some() {
            if let Some(fd) = inner.fd {
                if let Err(err) = kernel::preclose(fd) {
                    #[cfg(feature = "log")]
                    log::warn!("preclose failed: {err}");
                    let _ = err;
                }
            }
            if let Some(reader) = reader {
                reader.signal_wake();
            }
            if let Some(writer) = writer {
                writer.signal_wake();
            }
        }

        // Step 4: wait for thread slots to drain.
        inner = self.state.wait_for_drain(inner);

        // Step 5: run the closer, set CLOSED.
        if let Some(closer) = inner.closer.take() {
            closer.run();
        } else if let Some(fd) = inner.fd {
            let _ = kernel::close(fd);
        }
        inner.fd = None;
        Self::set_state(&mut inner, &self.state_fast, State::Closed);

        Ok(())
    }

    // ---- ownership transfer --------------------------------------------

    /// Atomically transfers `(fd, closer, stream, addresses, state)` from
    /// `self` to `target` under `target`'s state-lock. `self` becomes
    /// `CLOSED` without closing `fd`.
    pub fn copy_to(&self, target: &Endpoint) -> Result<()> {
        let mut src = self.state.lock();
        let fd = src.fd.take().ok_or(SocketError::NotOpen)?;
        let closer = src.closer.take();
        if let Some(closer) = &closer {
            closer.disable();
        }
        let remote_address = src.remote_address;
        let remote_port = src.remote_port;
        let local_port = src.local_port;
        let stream = src.stream;
        // `copyTo` does not carry over the non-blocking flag.
        Self::set_state(&mut src, &self.state_fast, State::Closed);
        drop(src);

        let mut dst = target.state.lock();
        dst.fd = Some(fd);
        dst.closer = closer.map(|_| Closer::new(fd, stream, Some(target.hooks.resource.clone())));
        dst.remote_address = remote_address;
        dst.remote_port = remote_port;
        dst.local_port = local_port;
        dst.stream = stream;
        dst.non_blocking = false;
        Endpoint::set_state(&mut dst, &target.state_fast, State::Connected);
        Ok(())
    }

    /// Same as `copy_to`, but the destination is a foreign endpoint type.
    pub fn copy_to_foreign(&self, target: &mut dyn ForeignEndpoint) -> Result<()> {
        let mut src = self.state.lock();
        let fd = src.fd.take().ok_or(SocketError::NotOpen)?;
        if let Some(closer) = src.closer.take() {
            closer.disable();
        }
        let remote_address = src.remote_address.ok_or(SocketError::NotConnected)?;
        let local_port = src.local_port;
        Self::set_state(&mut src, &self.state_fast, State::Closed);
        drop(src);

        target.install_boundary_fields(BoundaryFields {
            fd,
            local_port,
            remote_address,
            remote_port: remote_address.port(),
        });
        Ok(())
    }

    /// Finishes bookkeeping after a subclass's own native `accept` already
    /// populated `fd` out of band: looks up the local port and marks the
    /// endpoint `CONNECTED`.
    pub fn post_custom_accept(&self) -> Result<()> {
        let mut inner = self.state.lock();
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        let local = kernel::local_addr(fd)?;
        inner.local_port = local.port();
        if inner.closer.is_none() {
            inner.closer = Some(Closer::new(fd, inner.stream, Some(self.hooks.resource.clone())));
        }
        Self::set_state(&mut inner, &self.state_fast, State::Connected);
        Ok(())
    }

    // ---- options ---------------------------------------------------------

    pub fn supported_options(&self) -> &'static [SocketOption] {
        SUPPORTED_OPTIONS
    }

    pub fn get_option(&self, opt: SocketOption) -> Result<OptionValue> {
        let inner = self.state.lock();
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        Ok(match opt {
            SocketOption::Linger => OptionValue::Linger(kernel::get_linger(fd)?),
            SocketOption::Timeout => OptionValue::TimeoutMillis(inner.timeout_millis),
            SocketOption::ReuseAddress => OptionValue::Bool(inner.reuse_address),
            SocketOption::ReusePort => {
                #[cfg(target_os = "linux")]
                {
                    OptionValue::Bool(kernel::get_opt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT)?)
                }
                #[cfg(not(target_os = "linux"))]
                {
                    return Err(SocketError::Unsupported("SO_REUSEPORT"));
                }
            }
            SocketOption::SendBuffer => OptionValue::Int(kernel::get_opt_i32(fd, libc::SOL_SOCKET, libc::SO_SNDBUF)?),
            SocketOption::ReceiveBuffer => OptionValue::Int(kernel::get_opt_i32(fd, libc::SOL_SOCKET, libc::SO_RCVBUF)?),
            SocketOption::KeepAlive => OptionValue::Bool(kernel::get_opt_bool(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE)?),
            SocketOption::OobInline => OptionValue::Bool(kernel::get_opt_bool(fd, libc::SOL_SOCKET, libc::SO_OOBINLINE)?),
            // Cached so reads never need a syscall.
            SocketOption::Tos => OptionValue::Int(inner.traffic_class),
            SocketOption::NoDelay => OptionValue::Bool(kernel::get_opt_bool(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY)?),
        })
    }

    pub fn set_option(&self, opt: SocketOption, value: OptionValue) -> Result<()> {
        let mut inner = self.state.lock();
        let fd = inner.fd.ok_or(SocketError::NotOpen)?;
        match opt {
            SocketOption::Linger => kernel::set_linger(fd, value.as_linger()?)?,
            SocketOption::Timeout => inner.timeout_millis = value.as_timeout_millis()?,
            SocketOption::ReuseAddress => {
                // Emulated at endpoint level where bind is inherently
                // exclusive; on Linux, SO_REUSEADDR maps straight through.
                let want = value.as_bool()?;
                kernel::set_opt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, want)?;
                inner.reuse_address = want;
            }
            SocketOption::ReusePort => {
                #[cfg(target_os = "linux")]
                {
                    kernel::set_opt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, value.as_bool()?)?;
                }
                #[cfg(not(target_os = "linux"))]
                {
                    return Err(SocketError::Unsupported("SO_REUSEPORT"));
                }
            }
            SocketOption::SendBuffer => {
                let size = crate::options::validate_buffer_size(value.as_int()?)?;
                kernel::set_opt_i32(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, size)?;
            }
            SocketOption::ReceiveBuffer => {
                let size = crate::options::validate_buffer_size(value.as_int()?)?;
                kernel::set_opt_i32(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, size)?;
            }
            SocketOption::KeepAlive => kernel::set_opt_bool(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, value.as_bool()?)?,
            SocketOption::OobInline => kernel::set_opt_bool(fd, libc::SOL_SOCKET, libc::SO_OOBINLINE, value.as_bool()?)?,
            SocketOption::Tos => {
                let tos = value.as_int()?;
                kernel::set_opt_i32(fd, libc::IPPROTO_IP, libc::IP_TOS, tos)?;
                inner.traffic_class = tos;
            }
            SocketOption::NoDelay => kernel::set_opt_bool(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, value.as_bool()?)?,
        }
        Ok(())
    }

    // ---- the shared would-block loop ------------------------------------

    /// Generic over read/write/accept (`connect` has its own driver above
    /// since its completion condition, writable and `SO_ERROR` clear,
    /// doesn't fit the `IoOutcome<T>` shape the other three share).
    /// Thread-slot set/clear is the calling method's job, since it's the
    /// one that knows which field it owns.
    fn blocking_loop<T>(
        &self,
        fd: RawFd,
        interest: Interest,
        timeout_millis: u64,
        op_name: &'static str,
        mut attempt: impl FnMut(RawFd) -> Result<IoOutcome<T>>,
    ) -> Result<T> {
        if timeout_millis > 0 {
            let mut inner = self.state.lock();
            if !inner.non_blocking {
                kernel::set_nonblocking(fd, true)?;
                inner.non_blocking = true;
            }
        }

        let deadline = if timeout_millis > 0 {
            Some(Instant::now() + Duration::from_millis(timeout_millis))
        } else {
            None
        };

        loop {
            match attempt(fd)? {
                IoOutcome::Progress(v) => return self.epilogue(Ok(v)),
                IoOutcome::Eof => unreachable!("EOF is folded into Progress by the caller"),
                IoOutcome::Interrupted => continue,
                IoOutcome::Unavailable => {
                    if !self.is_open() {
                        return self.epilogue(Err(SocketError::Closed));
                    }
                    #[cfg(feature = "log")]
                    log::trace!("{op_name} would block on fd, parking on {interest:?}");
                    let wait_result = match deadline {
                        None => readiness::wait(fd, interest, None),
                        Some(dl) => {
                            let remaining = dl.saturating_duration_since(Instant::now());
                            if remaining.is_zero() {
                                return self.epilogue(Err(SocketError::Timeout { op: op_name }));
                            }
                            readiness::wait(fd, interest, Some(remaining))
                        }
                    }
                    .map_err(SocketError::from)?;
                    if wait_result == WaitOutcome::TimedOut && deadline.is_some() {
                        return self.epilogue(Err(SocketError::Timeout { op: op_name }));
                    }
                    // Ready or Interrupted: loop around and retry the
                    // syscall.
                }
            }
        }
    }

    /// Re-checks whether the state advanced past what the caller expects
    /// while the syscall/park was in flight.
    fn epilogue<T>(&self, result: Result<T>) -> Result<T> {
        if !self.is_open() {
            return Err(SocketError::Closed);
        }
        result
    }
}

impl Drop for Endpoint {
    /// Rust has no phantom-reachability cleaner; running the close
    /// protocol here is the deterministic analogue, guaranteeing the
    /// descriptor is closed even if the caller drops references without
    /// calling close. `close` is idempotent, so this is a no-op for an
    /// endpoint a caller already closed explicitly.
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Resolves a wildcard/unspecified connect target to a loopback address:
/// connecting to "any address" means connecting to the local host.
pub fn resolve_wildcard(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip == Ipv4Addr::UNSPECIFIED => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip == Ipv6Addr::UNSPECIFIED => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
