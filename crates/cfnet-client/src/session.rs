//! Encrypted session bound to a socket.

use std::io::{self, Read, Write};

use rustls::{ClientConnection, StreamOwned, pki_types::CertificateDer};

use crate::{error::RecvError, transport::Socket};

/// A rustls client session together with the socket it runs over.
///
/// Writes are all-or-nothing: [`Session::send`] either hands every byte to
/// the socket or fails, so callers never see a short write.
#[derive(Debug)]
pub struct Session<S: Socket> {
    stream: StreamOwned<ClientConnection, S>,
}

impl<S: Socket> Session<S> {
    pub(crate) fn new(tls: ClientConnection, socket: S) -> Self {
        Self { stream: StreamOwned::new(tls, socket) }
    }

    /// Drive the handshake until it completes or I/O fails.
    ///
    /// rustls keeps its state across errors, so calling this again after a
    /// transient failure resumes where the previous attempt stopped.
    pub(crate) fn complete_handshake(&mut self) -> io::Result<()> {
        while self.stream.conn.is_handshaking() {
            self.stream.conn.complete_io(&mut self.stream.sock)?;
        }
        Ok(())
    }

    /// Send all of `data`, or fail.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    /// Receive one line, terminator included.
    ///
    /// Reads byte by byte so nothing past the terminator is consumed; the
    /// remaining plaintext stays buffered in rustls for the next call.
    pub fn recv_line(&mut self, limit: usize) -> Result<Vec<u8>, RecvError> {
        let mut line = Vec::with_capacity(limit.min(256));
        let mut byte = [0u8; 1];

        while line.len() < limit {
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(RecvError::Closed { received: line.len() }),
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == cfnet_proto::LINE_TERMINATOR {
                        return Ok(line);
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(RecvError::Io(e)),
            }
        }

        Err(RecvError::TooLong { limit })
    }

    /// Send a TLS close_notify. Best effort; the socket may already be gone.
    pub fn close(&mut self) -> io::Result<()> {
        self.stream.conn.send_close_notify();
        self.stream.conn.complete_io(&mut self.stream.sock).map(|_| ())
    }

    /// Negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<rustls::CipherSuite> {
        self.stream.conn.negotiated_cipher_suite().map(|s| s.suite())
    }

    /// Negotiated TLS version.
    pub fn tls_version(&self) -> Option<rustls::ProtocolVersion> {
        self.stream.conn.protocol_version()
    }

    /// Certificate chain the server presented, end entity first.
    pub fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.stream.conn.peer_certificates()
    }

    /// Underlying socket.
    pub fn socket(&self) -> &S {
        &self.stream.sock
    }

    /// Mutable access to the underlying socket.
    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.stream.sock
    }

    pub(crate) fn into_socket(self) -> S {
        self.stream.sock
    }
}
