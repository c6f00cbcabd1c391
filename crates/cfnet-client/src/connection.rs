//! Per-connection state record.
//!
//! A [`Connection`] pairs a connected socket with the application protocol
//! spoken over it. The encrypted session replaces the plain socket when the
//! handshake completes, so "session present" and "tagged TLS" cannot
//! disagree: the tag is [`ProtocolVersion::Tls`] exactly when a session
//! exists.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────┐  handshake  ┌──────────┐  ok   ┌─────────┐
//! │ Unsecured │────────────>│ Securing │──────>│ Secured │──┐ handshake: no-op
//! └───────────┘             └──────────┘       └─────────┘<─┘
//!       ^                        │ fail             │
//!       └────────────────────────┘                  ↓
//!                                   negotiate_protocol / send_identity
//! ```

use crate::{error::ConnectionError, session::Session, transport::Socket};

/// Application protocol spoken on a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Not decided yet.
    #[default]
    Undefined,
    /// Legacy plaintext protocol.
    Classic,
    /// Protocol over TLS.
    Tls,
}

#[derive(Debug)]
enum Channel<S: Socket> {
    Plain(S),
    Secured(Box<Session<S>>),
    Closed,
}

/// A connection and the protocol spoken on it.
#[derive(Debug)]
pub struct Connection<S: Socket> {
    protocol: ProtocolVersion,
    channel: Channel<S>,
}

impl<S: Socket> Connection<S> {
    /// Wrap a connected, blocking socket. The protocol starts out undefined.
    pub fn new(socket: S) -> Self {
        Self { protocol: ProtocolVersion::Undefined, channel: Channel::Plain(socket) }
    }

    /// Protocol spoken on this connection.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Tag a plain connection as `Undefined` or `Classic`.
    ///
    /// # Errors
    ///
    /// `ProtocolMismatch` when asked for `Tls` (only a handshake may set
    /// that) or when the connection is already secured.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) -> Result<(), ConnectionError> {
        if version == ProtocolVersion::Tls || self.protocol == ProtocolVersion::Tls {
            return Err(ConnectionError::ProtocolMismatch { from: self.protocol, to: version });
        }
        self.protocol = version;
        Ok(())
    }

    /// Whether a TLS session is established.
    pub fn is_secured(&self) -> bool {
        matches!(self.channel, Channel::Secured(_))
    }

    /// Underlying socket, whether or not it is wrapped in a session.
    pub fn socket(&self) -> Option<&S> {
        match &self.channel {
            Channel::Plain(socket) => Some(socket),
            Channel::Secured(session) => Some(session.socket()),
            Channel::Closed => None,
        }
    }

    /// The encrypted session, once the handshake has completed.
    pub fn session(&self) -> Option<&Session<S>> {
        match &self.channel {
            Channel::Secured(session) => Some(session.as_ref()),
            _ => None,
        }
    }

    /// Mutable access to the encrypted session.
    pub fn session_mut(&mut self) -> Option<&mut Session<S>> {
        match &mut self.channel {
            Channel::Secured(session) => Some(session.as_mut()),
            _ => None,
        }
    }

    /// End the connection, sending a TLS close_notify if secured.
    ///
    /// The socket is dropped. Idempotent.
    ///
    /// If the server sent data this side never read (TLS 1.3 session
    /// tickets, for one), the kernel answers the close with a reset, and the
    /// server may lose lines it had not read yet. Callers that need the last
    /// line delivered should wait for the server's reply before closing.
    pub fn close(&mut self) {
        if let Channel::Secured(session) = &mut self.channel
            && let Err(e) = session.close()
        {
            tracing::debug!(error = %e, "close_notify not delivered");
        }
        self.channel = Channel::Closed;
        self.protocol = ProtocolVersion::Undefined;
    }

    /// Move the plain socket out for a handshake attempt.
    pub(crate) fn take_plain(&mut self) -> Result<(S, ProtocolVersion), ConnectionError> {
        match std::mem::replace(&mut self.channel, Channel::Closed) {
            Channel::Plain(socket) => Ok((socket, self.protocol)),
            Channel::Closed => Err(ConnectionError::Closed),
            secured @ Channel::Secured(_) => {
                self.channel = secured;
                Err(ConnectionError::ProtocolMismatch {
                    from: ProtocolVersion::Tls,
                    to: ProtocolVersion::Tls,
                })
            },
        }
    }

    /// Put a plain socket back after a failed handshake.
    pub(crate) fn restore_plain(&mut self, socket: S, protocol: ProtocolVersion) {
        self.channel = Channel::Plain(socket);
        self.protocol = protocol;
    }

    /// Install a completed session and tag the connection as TLS.
    pub(crate) fn install_session(&mut self, session: Session<S>) {
        self.channel = Channel::Secured(Box::new(session));
        self.protocol = ProtocolVersion::Tls;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};

    use super::*;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn new_connection_is_undefined_and_plain() {
        let (client, _server) = socket_pair();
        let conn = Connection::new(client);

        assert_eq!(conn.protocol_version(), ProtocolVersion::Undefined);
        assert!(!conn.is_secured());
        assert!(conn.session().is_none());
        assert!(conn.socket().is_some());
    }

    #[test]
    fn plain_tags_can_be_set() {
        let (client, _server) = socket_pair();
        let mut conn = Connection::new(client);

        conn.set_protocol_version(ProtocolVersion::Classic).unwrap();
        assert_eq!(conn.protocol_version(), ProtocolVersion::Classic);
    }

    #[test]
    fn tls_tag_cannot_be_forged() {
        let (client, _server) = socket_pair();
        let mut conn = Connection::new(client);

        let result = conn.set_protocol_version(ProtocolVersion::Tls);
        assert!(matches!(result, Err(ConnectionError::ProtocolMismatch { .. })));
        assert_eq!(conn.protocol_version(), ProtocolVersion::Undefined);
    }

    #[test]
    fn take_and_restore_keeps_tag() {
        let (client, _server) = socket_pair();
        let mut conn = Connection::new(client);
        conn.set_protocol_version(ProtocolVersion::Classic).unwrap();

        let (socket, previous) = conn.take_plain().unwrap();
        assert!(conn.socket().is_none());

        conn.restore_plain(socket, previous);
        assert_eq!(conn.protocol_version(), ProtocolVersion::Classic);
        assert!(conn.socket().is_some());
    }

    #[test]
    fn closed_connection_cannot_be_taken() {
        let (client, _server) = socket_pair();
        let mut conn = Connection::new(client);
        conn.close();
        conn.close();

        assert!(matches!(conn.take_plain(), Err(ConnectionError::Closed)));
        assert!(conn.socket().is_none());
    }
}
