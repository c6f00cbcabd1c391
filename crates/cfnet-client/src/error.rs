//! Error types for each stage of connection establishment.
//!
//! Each stage has its own enum so callers can tell a setup problem (missing
//! keys) from a network problem (handshake I/O) without string matching.
//! Server disagreement on the protocol version is not an error; see
//! [`crate::negotiate::Negotiation`].

use std::{io, path::PathBuf, time::Duration};

use cfnet_proto::LineError;
use thiserror::Error;

use crate::connection::ProtocolVersion;

/// Key store failures
#[derive(Error, Debug)]
pub enum KeyError {
    /// Key file could not be read
    #[error("failed to read key file {path}: {source}")]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Key file holds no private key
    #[error("no private key found in {path}")]
    NoPrivateKey {
        /// File that was read
        path: PathBuf,
    },

    /// Key file holds a private key that is neither PKCS#8 nor RSA PKCS#1
    #[error("private key in {path} is neither PKCS#8 nor RSA PKCS#1")]
    UnsupportedFormat {
        /// File that was read
        path: PathBuf,
    },

    /// Key bytes could not be parsed
    #[error("invalid private key: {0}")]
    Parse(rcgen::Error),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    Generate(rcgen::Error),
}

/// Certificate synthesis failures
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The private key could not be used for signing
    #[error("unusable private key: {0}")]
    Key(rcgen::Error),

    /// Building or signing the certificate failed
    #[error("certificate generation failed: {0}")]
    Generate(rcgen::Error),
}

/// TLS context setup failures
///
/// Every variant leaves the context uninitialized.
#[derive(Error, Debug)]
pub enum ContextError {
    /// No key pair is loaded, even after a reload
    #[error("no public/private key pair found")]
    MissingKeys,

    /// Certificate synthesis failed
    #[error("failed to generate in-memory certificate from private key: {0}")]
    Certificate(#[from] CertificateError),

    /// The crypto provider cannot use the private key
    #[error("failed to use private key: {0}")]
    UnsupportedKey(rustls::Error),

    /// Certificate and private key do not belong together
    #[error("inconsistent key and TLS certificate: {0}")]
    InconsistentKeys(rustls::Error),

    /// rustls refused the configuration
    #[error("TLS configuration rejected: {0}")]
    Tls(rustls::Error),

    /// An operation needed the context before `initialize` succeeded
    #[error("TLS context is not initialized")]
    NotInitialized,
}

/// Connection record misuse
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The protocol tag cannot be changed this way
    #[error("cannot switch protocol from {from:?} to {to:?}")]
    ProtocolMismatch {
        /// Current tag
        from: ProtocolVersion,
        /// Requested tag
        to: ProtocolVersion,
    },

    /// The connection was closed by the caller
    #[error("connection is closed")]
    Closed,
}

/// Handshake failures
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Context missing or unusable
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The connection cannot start a handshake
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Could not determine the name to present to the server
    #[error("cannot determine server name: {0}")]
    ServerName(io::Error),

    /// rustls could not allocate a session
    #[error("failed to create TLS session: {0}")]
    Session(rustls::Error),

    /// First attempt failed and the socket never became writable
    #[error("handshake failed and socket was not writable within {waited:?}: {source}")]
    NotWritable {
        /// How long the socket was watched
        waited: Duration,
        /// Error from the first attempt
        source: io::Error,
    },

    /// Waiting for writability itself failed
    #[error("handshake failed and socket readiness could not be checked: {0}")]
    Wait(io::Error),

    /// Both attempts failed
    #[error("handshake failed after retry: {source}")]
    RetryFailed {
        /// Error from the first attempt
        first: io::Error,
        /// Error from the retry
        source: io::Error,
    },
}

/// Failures while reading a line from the encrypted channel
#[derive(Error, Debug)]
pub enum RecvError {
    /// Transport or TLS error
    #[error("receive failed: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the channel before sending a full line
    #[error("connection closed by peer after {received} bytes")]
    Closed {
        /// Bytes of the partial line
        received: usize,
    },

    /// Peer sent more than `limit` bytes without a terminator
    #[error("line exceeds {limit} bytes")]
    TooLong {
        /// Maximum accepted line size
        limit: usize,
    },
}

/// Protocol version negotiation failures
#[derive(Error, Debug)]
pub enum NegotiationError {
    /// The connection has not completed the TLS handshake
    #[error("connection is not secured")]
    NotSecured,

    /// The announcement could not be built
    #[error("cannot format version line: {0}")]
    Format(#[from] LineError),

    /// Receiving the server's announcement or verdict failed
    #[error(transparent)]
    Recv(#[from] RecvError),

    /// The server went away while the announcement was being sent
    #[error("connection was hung up: {0}")]
    HungUp(io::Error),
}

/// Identity announcement failures
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The connection has not completed the TLS handshake
    #[error("connection is not secured")]
    NotSecured,

    /// The line would be truncated or malformed; nothing was sent
    #[error("sending IDENTITY truncated: {0}")]
    Format(#[from] LineError),

    /// Sending failed
    #[error("failed to send IDENTITY: {0}")]
    Send(io::Error),
}

/// Failures of the combined establishment flow
#[derive(Error, Debug)]
pub enum EstablishError {
    /// Context initialization failed
    #[error(transparent)]
    Context(#[from] ContextError),

    /// TLS handshake failed
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Version negotiation failed
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Identity announcement failed
    #[error(transparent)]
    Identity(#[from] IdentityError),
}
