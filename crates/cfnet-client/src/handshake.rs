//! TLS handshake initiation.
//!
//! The client starts TLS directly on an already-connected TCP socket. A
//! server that does not speak TLS simply fails the handshake.
//!
//! # Retry
//!
//! A handshake interrupted by a transient condition gets exactly one more
//! attempt, and only if the socket becomes writable within
//! [`RETRY_WAIT`]. There is never a third attempt.
//!
//! # Trust
//!
//! A successful handshake proves only that the server holds the key of the
//! certificate it presented. Whether that key belongs to a trusted host is
//! the caller's decision, made with the [`UnverifiedPeer`] this module
//! returns.

use std::time::Duration;

use rustls::{
    ClientConnection,
    pki_types::{CertificateDer, ServerName},
};
use tracing::{debug, error, warn};

use crate::{
    certificate::CertificateFactory,
    connection::Connection,
    context::ClientContext,
    error::HandshakeError,
    keys::KeyStore,
    session::Session,
    transport::Socket,
};

/// How long to wait for writability before the single retry.
pub const RETRY_WAIT: Duration = Duration::from_secs(10);

/// Handshake configuration
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Bound on the writability wait before retrying
    pub retry_wait: Duration,
    /// Name presented to the server. Defaults to the peer's IP address, in
    /// which case no SNI extension is sent.
    pub server_name: Option<ServerName<'static>>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self { retry_wait: RETRY_WAIT, server_name: None }
    }
}

/// Result of [`initiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the server certificate must still be checked for trust"]
pub enum HandshakeOutcome {
    /// A new session was established.
    Established(UnverifiedPeer),
    /// The connection was already secured; nothing was done.
    AlreadySecured,
}

/// What the server presented during a completed handshake.
///
/// The certificate was accepted unconditionally. The caller is expected to
/// match it against its own records before trusting the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedPeer {
    /// Server certificate chain, end entity first.
    pub certificates: Vec<CertificateDer<'static>>,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<rustls::CipherSuite>,
    /// Negotiated TLS version.
    pub tls_version: Option<rustls::ProtocolVersion>,
}

impl UnverifiedPeer {
    /// The server's own certificate.
    pub fn end_entity(&self) -> Option<&CertificateDer<'static>> {
        self.certificates.first()
    }
}

/// Perform the TLS handshake on `conn`.
///
/// The socket must be connected and in blocking mode, and `ctx` initialized.
///
/// On success the connection is tagged
/// [`ProtocolVersion::Tls`](crate::connection::ProtocolVersion::Tls) and owns the
/// session. On failure the plain socket and previous tag are put back; the
/// socket is usually not reusable after a failed handshake, but the caller
/// decides.
///
/// # Errors
///
/// - `Context` if `ctx` is not initialized
/// - `Session` if rustls cannot allocate a session
/// - `NotWritable`, `Wait` or `RetryFailed` if the handshake fails
pub fn initiate<S, K, C>(
    conn: &mut Connection<S>,
    ctx: &ClientContext<K, C>,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome, HandshakeError>
where
    S: Socket,
    K: KeyStore,
    C: CertificateFactory,
{
    if conn.is_secured() {
        warn!("already in TLS mode, skipping handshake");
        return Ok(HandshakeOutcome::AlreadySecured);
    }

    let tls = ctx.tls_config()?;
    let (socket, previous) = conn.take_plain()?;

    let server_name = match &config.server_name {
        Some(name) => name.clone(),
        None => match socket.peer_addr() {
            Ok(addr) => ServerName::from(addr.ip()),
            Err(e) => {
                conn.restore_plain(socket, previous);
                return Err(HandshakeError::ServerName(e));
            },
        },
    };

    let tls_conn = match ClientConnection::new(tls, server_name) {
        Ok(tls_conn) => tls_conn,
        Err(e) => {
            error!(error = %e, "failed to create TLS session");
            conn.restore_plain(socket, previous);
            return Err(HandshakeError::Session(e));
        },
    };

    let mut session = Session::new(tls_conn, socket);
    if let Err(e) = run_with_retry(&mut session, config.retry_wait) {
        conn.restore_plain(session.into_socket(), previous);
        return Err(e);
    }

    let peer = UnverifiedPeer {
        certificates: session.peer_certificates().map(<[_]>::to_vec).unwrap_or_default(),
        cipher_suite: session.cipher_suite(),
        tls_version: session.tls_version(),
    };
    debug!(
        cipher = ?peer.cipher_suite,
        version = ?peer.tls_version,
        "TLS cipher negotiated"
    );
    debug!("TLS session established, trust check pending");

    conn.install_session(session);
    Ok(HandshakeOutcome::Established(peer))
}

fn run_with_retry<S: Socket>(session: &mut Session<S>, wait: Duration) -> Result<(), HandshakeError> {
    let Err(first) = session.complete_handshake() else {
        return Ok(());
    };
    error!(error = %first, "connection handshake client failed");
    debug!("checking if the handshake can be retried");

    match session.socket().wait_writable(wait) {
        Ok(true) => {
            debug!("the handshake can be retried");
        },
        Ok(false) => {
            debug!(waited = ?wait, "the handshake cannot be retried");
            return Err(HandshakeError::NotWritable { waited: wait, source: first });
        },
        Err(e) => {
            debug!(error = %e, "the handshake cannot be retried");
            return Err(HandshakeError::Wait(e));
        },
    }

    match session.complete_handshake() {
        Ok(()) => {
            debug!("the handshake was retried and succeeded");
            Ok(())
        },
        Err(source) => {
            debug!("the handshake was retried and failed");
            error!(error = %source, "connection handshake client failed");
            Err(HandshakeError::RetryFailed { first, source })
        },
    }
}
