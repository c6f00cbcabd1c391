//! Fault-injecting socket wrapper.
//!
//! Wraps a real `TcpStream` and fails reads on demand with `WouldBlock`,
//! the error a blocking socket with a receive timeout reports when the peer
//! is slow. Writes can be failed with `BrokenPipe` to simulate a peer that
//! hung up. The [`FaultProbe`] stays with the test after the socket has been
//! moved into a connection, so the test can count what happened.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use cfnet_client::Socket;

#[derive(Debug, Default)]
struct FaultState {
    read_failures_left: AtomicUsize,
    read_failures: AtomicUsize,
    never_writable: AtomicBool,
    hung_up: AtomicBool,
    wait_calls: AtomicUsize,
    bytes_written: AtomicUsize,
}

/// A `TcpStream` that can be told to misbehave.
#[derive(Debug)]
pub struct FlakySocket {
    inner: TcpStream,
    state: Arc<FaultState>,
}

/// Handle on a [`FlakySocket`]'s counters, kept by the test.
#[derive(Debug, Clone)]
pub struct FaultProbe {
    state: Arc<FaultState>,
}

impl FlakySocket {
    /// Wrap `inner`, initially well-behaved.
    pub fn new(inner: TcpStream) -> (Self, FaultProbe) {
        let state = Arc::new(FaultState::default());
        (Self { inner, state: Arc::clone(&state) }, FaultProbe { state })
    }

    /// Fail the next `count` reads with `WouldBlock`.
    pub fn fail_reads(self, count: usize) -> Self {
        self.state.read_failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Report the socket as never becoming writable.
    pub fn never_writable(self) -> Self {
        self.state.never_writable.store(true, Ordering::SeqCst);
        self
    }
}

impl FaultProbe {
    /// Reads failed on purpose so far.
    pub fn read_failures(&self) -> usize {
        self.state.read_failures.load(Ordering::SeqCst)
    }

    /// Calls to `wait_writable` so far.
    pub fn wait_calls(&self) -> usize {
        self.state.wait_calls.load(Ordering::SeqCst)
    }

    /// Bytes handed to the underlying socket so far.
    pub fn bytes_written(&self) -> usize {
        self.state.bytes_written.load(Ordering::SeqCst)
    }

    /// Fail every later write with `BrokenPipe`, as if the peer had gone.
    pub fn hang_up(&self) {
        self.state.hung_up.store(true, Ordering::SeqCst);
    }
}

impl Read for FlakySocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let injected = self
            .state
            .read_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            self.state.read_failures.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "injected read failure"));
        }
        self.inner.read(buf)
    }
}

impl Write for FlakySocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.hung_up.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected hang-up"));
        }
        let written = self.inner.write(buf)?;
        self.state.bytes_written.fetch_add(written, Ordering::SeqCst);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Socket for FlakySocket {
    fn wait_writable(&self, timeout: Duration) -> io::Result<bool> {
        self.state.wait_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.never_writable.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.wait_writable(timeout)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}
