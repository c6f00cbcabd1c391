//! Socket abstraction for the handshake.
//!
//! Connections run over blocking sockets. The only readiness check in the
//! whole establishment flow is the single bounded wait before a handshake
//! retry, so this trait exposes exactly that instead of a full event loop.
//! Production uses [`std::net::TcpStream`]; tests wrap it to inject faults.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

/// A connected, blocking byte stream.
pub trait Socket: Read + Write {
    /// Wait up to `timeout` for the socket to become writable.
    ///
    /// Returns `Ok(false)` if the timeout expired first.
    fn wait_writable(&self, timeout: Duration) -> io::Result<bool>;

    /// Address of the remote end.
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl Socket for TcpStream {
    fn wait_writable(&self, timeout: Duration) -> io::Result<bool> {
        use rustix::event::{PollFd, PollFlags, poll};

        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut fds = [PollFd::new(self, PollFlags::OUT)];
        let ready = poll(&mut fds, millis)?;
        Ok(ready > 0)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}
