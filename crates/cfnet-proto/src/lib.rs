//! Line formats for the cfnet negotiation phase.
//!
//! Once the TLS handshake completes, client and server exchange a handful of
//! newline-terminated text lines before any payload flows:
//!
//! ```text
//! server ── CFE_v2 cf-serverd 3.21.0\n ──> client
//! client ── CFE_v2 cf-agent 3.21.0\n   ──> server
//! server ── OK WELCOME\n               ──> client
//! client ── IDENTITY USERNAME=root\n   ──> server
//! ```
//!
//! This crate only encodes and parses those lines. It never touches a socket,
//! so the framing rules can be tested exhaustively without a peer.
//!
//! # Limits
//!
//! Every outbound line must fit a fixed buffer ([`MAX_VERSION_LINE`],
//! [`MAX_IDENTITY_LINE`]). Encoding fails instead of truncating: a shortened
//! line would still be well-formed and the server would act on the wrong
//! value.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod identity;
pub mod reply;
pub mod version;

pub use errors::{LineError, Result};
pub use identity::{IDENTITY_KEYWORD, IdentityLine, MAX_IDENTITY_LINE};
pub use reply::{ACCEPT_PREFIX, MAX_RECV_LINE, Verdict};
pub use version::{DEFAULT_AGENT_TAG, MAX_VERSION_LINE, VERSION_PREFIX, VersionLine};

/// Line terminator shared by every negotiation message.
pub const LINE_TERMINATOR: u8 = b'\n';
