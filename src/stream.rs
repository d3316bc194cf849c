//! Byte-stream views over an `Endpoint`: `std::io::Read`/`Write` adapters
//! that add sticky EOF/reset flags and the full-buffer write loop the raw
//! `Endpoint::write` doesn't attempt on its own.
//!
//! Grounded in shape on mio's `net::TcpStream` read/write split, but
//! these two types borrow an `Arc<Endpoint>` rather than owning the fd
//! themselves, so several `ReadStream`/`WriteStream` pairs can outlive one
//! another independently while still sharing one endpoint's close.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::endpoint::{Endpoint, MAX_BUFFER_SIZE};
use crate::error::SocketError;

/// The read side of an endpoint. `std::io::Read::read` returns `Ok(0)` at
/// EOF per the trait's contract; the sticky `eof` flag means once EOF is
/// observed, every subsequent `read` short-circuits to `Ok(0)` without a
/// further syscall. A connection reset is distinct from EOF and gets its
/// own sticky `reset` flag: once latched, every subsequent `read` reports
/// "connection reset" again without a further syscall, rather than folding
/// into plain EOF.
#[derive(Debug)]
pub struct ReadStream {
    endpoint: Arc<Endpoint>,
    eof: AtomicBool,
    reset: AtomicBool,
}

impl ReadStream {
    pub fn new(endpoint: Arc<Endpoint>) -> ReadStream {
        ReadStream { endpoint, eof: AtomicBool::new(false), reset: AtomicBool::new(false) }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Bytes available to read without blocking.
    pub fn available(&self) -> io::Result<usize> {
        Ok(self.endpoint.available()?)
    }

    fn is_reset(err: &SocketError) -> bool {
        matches!(err, SocketError::ConnectionReset)
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reset.load(Ordering::Acquire) {
            return Err(SocketError::ConnectionReset.into());
        }
        if self.eof.load(Ordering::Acquire) {
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        match self.endpoint.read(buf) {
            Ok(-1) => {
                self.eof.store(true, Ordering::Release);
                Ok(0)
            }
            Ok(n) => Ok(n as usize),
            Err(err) if Self::is_reset(&err) => {
                self.reset.store(true, Ordering::Release);
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// The write side of an endpoint. Unlike `Endpoint::write`, `Write::write`
/// loops until the whole buffer (capped per call at `MAX_BUFFER_SIZE`
/// chunks) is accepted by the kernel.
#[derive(Debug)]
pub struct WriteStream {
    endpoint: Arc<Endpoint>,
    reset: AtomicBool,
}

impl WriteStream {
    pub fn new(endpoint: Arc<Endpoint>) -> WriteStream {
        WriteStream { endpoint, reset: AtomicBool::new(false) }
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.reset.load(Ordering::Acquire) {
            return Err(SocketError::ConnectionReset.into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = &buf[..buf.len().min(MAX_BUFFER_SIZE)];
        match self.endpoint.write(chunk) {
            Ok(n) => Ok(n),
            Err(err) => {
                if matches!(err, SocketError::ConnectionReset) {
                    self.reset.store(true, Ordering::Release);
                }
                Err(err.into())
            }
        }
    }

    /// A chunked write already hands bytes to the kernel socket buffer as
    /// soon as each underlying `write` returns; there's no userspace
    /// buffering layer here to flush.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Write for &WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.reset.load(Ordering::Acquire) {
            return Err(SocketError::ConnectionReset.into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = &buf[..buf.len().min(MAX_BUFFER_SIZE)];
        match self.endpoint.write(chunk) {
            Ok(n) => Ok(n),
            Err(err) => {
                if matches!(err, SocketError::ConnectionReset) {
                    self.reset.store(true, Ordering::Release);
                }
                Err(err.into())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::thread;

    fn listener_pair() -> (Arc<Endpoint>, SocketAddr) {
        let server = Arc::new(Endpoint::with_default_hooks(true));
        server.create(true).unwrap();
        server.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        server.listen(8).unwrap();
        let addr: SocketAddr = format!("127.0.0.1:{}", server.local_port()).parse().unwrap();
        (server, addr)
    }

    #[test]
    fn echo_roundtrip_through_stream_views() {
        let (server, addr) = listener_pair();

        let accept_thread = thread::spawn(move || server.accept().unwrap());

        let client = Arc::new(Endpoint::with_default_hooks(false));
        client.create(true).unwrap();
        client.connect(addr, 0).unwrap();

        let accepted = Arc::new(accept_thread.join().unwrap());

        let mut client_writer = WriteStream::new(client.clone());
        client_writer.write_all(b"ping").unwrap();

        let mut server_reader = ReadStream::new(accepted.clone());
        let mut buf = [0u8; 4];
        server_reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        let mut server_writer = WriteStream::new(accepted.clone());
        server_writer.write_all(b"pong").unwrap();

        let mut client_reader = ReadStream::new(client.clone());
        let mut reply = [0u8; 4];
        client_reader.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");

        client.close().unwrap();
        accepted.close().unwrap();
    }

    #[test]
    fn empty_write_is_noop() {
        let ep = Arc::new(Endpoint::with_default_hooks(false));
        let mut writer = WriteStream::new(ep);
        assert_eq!(writer.write(&[]).unwrap(), 0);
    }

    #[test]
    fn empty_read_is_noop() {
        let ep = Arc::new(Endpoint::with_default_hooks(false));
        let mut reader = ReadStream::new(ep);
        let mut buf = [0u8; 0];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
