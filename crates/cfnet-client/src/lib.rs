//! Client side of cfnet connection establishment.
//!
//! Opening a connection to a server is a layered affair:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ ClientContext    │──>│ TLS          │──>│ version     │──>│ IDENTITY │
//! │ (keys, cert,     │   │ handshake    │   │ negotiation │   │ line     │
//! │  rustls config)  │   │ (1 retry)    │   │ (CFE_v<N>)  │   │          │
//! └──────────────────┘   └──────────────┘   └─────────────┘   └──────────┘
//! ```
//!
//! All I/O is blocking and single-threaded per connection. The context is
//! built once and shared read-only by every connection.
//!
//! # Components
//!
//! - [`context`]: TLS configuration lifecycle
//! - [`handshake`]: TLS handshake with one bounded retry
//! - [`negotiate`]: protocol version negotiation
//! - [`identity`]: identity announcement
//! - [`client`]: the four stages run in order
//! - [`connection`]: per-connection state record
//! - [`keys`] / [`certificate`]: key and certificate collaborators
//! - [`transport`]: socket abstraction
//! - [`error`]: error types
//!
//! # Trust
//!
//! Server certificates are accepted during the handshake and returned to the
//! caller as an [`UnverifiedPeer`]. Deciding whether that server is trusted
//! is the caller's job and must happen before payload traffic.

pub mod certificate;
pub mod client;
pub mod connection;
pub mod context;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod keys;
pub mod negotiate;
pub mod session;
pub mod transport;
pub mod verifier;

pub use certificate::{CertificateFactory, SelfSignedCertificates};
pub use cfnet_proto::DEFAULT_AGENT_TAG;
pub use client::{EstablishConfig, Established, TLS_PROTOCOL_ID, establish};
pub use connection::{Connection, ProtocolVersion};
pub use context::{ClientContext, ContextConfig, TlsVersion};
pub use error::{
    CertificateError, ConnectionError, ContextError, EstablishError, HandshakeError,
    IdentityError, KeyError, NegotiationError, RecvError,
};
pub use handshake::{HandshakeConfig, HandshakeOutcome, RETRY_WAIT, UnverifiedPeer, initiate};
pub use identity::send_identity;
pub use keys::{HostKeyPair, KeyStore, MemoryKeyStore, PemKeyStore};
pub use negotiate::{AgentInfo, Negotiation, negotiate_protocol};
pub use session::Session;
pub use transport::Socket;
