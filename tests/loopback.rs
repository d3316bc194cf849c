//! Loopback integration tests: happy echo, read timeout, async-close
//! unblock, half-shutdown, connect timeout, and chunked large transfer.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sockbridge::{Endpoint, ReadStream, WriteStream};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn listener() -> (Arc<Endpoint>, SocketAddr) {
    init();
    let server = Arc::new(Endpoint::with_default_hooks(true));
    server.create(true).unwrap();
    server.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    server.listen(16).unwrap();
    let addr: SocketAddr = format!("127.0.0.1:{}", server.local_port()).parse().unwrap();
    (server, addr)
}

fn connected_pair() -> (Arc<Endpoint>, Arc<Endpoint>) {
    let (server, addr) = listener();
    let accept_thread = thread::spawn(move || server.accept().unwrap());

    let client = Arc::new(Endpoint::with_default_hooks(false));
    client.create(true).unwrap();
    client.connect(addr, 0).unwrap();

    let accepted = Arc::new(accept_thread.join().unwrap());
    (client, accepted)
}

#[test]
fn happy_echo() {
    let (client, accepted) = connected_pair();

    let mut client_writer = WriteStream::new(client.clone());
    client_writer.write_all(b"hello").unwrap();

    let mut server_reader = ReadStream::new(accepted.clone());
    let mut buf = [0u8; 5];
    server_reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    let mut server_writer = WriteStream::new(accepted.clone());
    server_writer.write_all(b"world").unwrap();

    let mut client_reader = ReadStream::new(client.clone());
    let mut reply = [0u8; 5];
    client_reader.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"world");
}

#[test]
fn read_times_out_when_peer_sends_nothing() {
    let (_client, accepted) = connected_pair();
    accepted.set_option(sockbridge::SocketOption::Timeout, sockbridge::OptionValue::TimeoutMillis(50)).unwrap();

    let started = Instant::now();
    let mut buf = [0u8; 16];
    let err = accepted.read(&mut buf).unwrap_err();
    assert!(err.is_timeout(), "expected a timeout, got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[test]
fn closing_from_another_thread_unblocks_a_parked_read() {
    let (_client, accepted) = connected_pair();
    accepted.set_option(sockbridge::SocketOption::Timeout, sockbridge::OptionValue::TimeoutMillis(5_000)).unwrap();

    let reader = accepted.clone();
    let read_thread = thread::spawn(move || {
        let mut buf = [0u8; 16];
        reader.read(&mut buf)
    });

    thread::sleep(Duration::from_millis(30));
    accepted.close().unwrap();

    let result = read_thread.join().unwrap();
    let err = result.unwrap_err();
    assert!(err.is_closed(), "expected a closed-socket error, got {err:?}");
}

#[test]
fn half_shutdown_lets_one_direction_keep_working() {
    let (client, accepted) = connected_pair();

    client.shutdown_output().unwrap();
    assert!(client.is_output_closed());

    // accepted's read side observes EOF, its write side is unaffected.
    let mut buf = [0u8; 16];
    let n = accepted.read(&mut buf).unwrap();
    assert_eq!(n, -1);

    let mut server_writer = WriteStream::new(accepted.clone());
    server_writer.write_all(b"still alive").unwrap();

    let mut client_reader = ReadStream::new(client.clone());
    let mut reply = [0u8; 11];
    client_reader.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"still alive");
}

#[test]
fn connect_to_an_unreachable_address_times_out() {
    // A loopback port nothing is listening on, with a listener backlog
    // of zero so the kernel has no chance of silently accepting.
    let (probe, probe_addr) = listener();
    drop(probe); // release the port but keep the address unreachable

    let client = Arc::new(Endpoint::with_default_hooks(false));
    client.create(true).unwrap();
    let result = client.connect(probe_addr, 50);
    // Either a prompt connection-refused or a timeout is an acceptable
    // outcome on loopback (the kernel usually answers RST immediately);
    // what must never happen is silently succeeding.
    assert!(result.is_err());
}

#[test]
fn write_caps_each_call_at_max_buffer_size() {
    let (client, _accepted) = connected_pair();

    let big = vec![0xAAu8; sockbridge::MAX_BUFFER_SIZE * 3];
    // A single raw `Endpoint::write` call never exceeds the cap, even
    // though the peer (`_accepted`, kept alive so the write has somewhere
    // to go) would happily absorb more into its receive buffer.
    let n = client.write(&big).unwrap();
    assert!(n <= sockbridge::MAX_BUFFER_SIZE);
}
