//! Protocol version negotiation over an established TLS session.
//!
//! ```text
//! client                                  server
//!   │ <──────── CFE_v2 cf-serverd 3.21.0 ────│
//!   │ ───────── CFE_v2 cf-agent 3.21.0 ─────>│
//!   │ <──────── OK ... / anything else ──────│
//! ```
//!
//! A reply that does not start with `OK` is a negotiated outcome, not a
//! failure: the server is reachable but does not speak the announced
//! version, and the caller may fall back to the classic protocol.

use cfnet_proto::{MAX_RECV_LINE, Verdict, VersionLine};
use tracing::{debug, error, info};

use crate::{connection::Connection, error::NegotiationError, transport::Socket};

/// Outcome of a completed negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The server accepted the announced version.
    Accepted,
    /// The server declined the announced version.
    Rejected,
}

impl Negotiation {
    /// Whether the server accepted.
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl From<Verdict> for Negotiation {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Accepted => Self::Accepted,
            Verdict::Rejected => Self::Rejected,
        }
    }
}

/// Identity the client announces in its version line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    /// Numeric protocol identifier.
    pub protocol: u32,
    /// Software tag, e.g. `cf-agent`.
    pub agent: String,
    /// Software version string.
    pub version: String,
}

impl AgentInfo {
    /// Describe the announcing client.
    pub fn new(protocol: u32, agent: impl Into<String>, version: impl Into<String>) -> Self {
        Self { protocol, agent: agent.into(), version: version.into() }
    }

    fn version_line(&self) -> VersionLine {
        VersionLine::new(self.protocol, self.agent.clone(), self.version.clone())
    }
}

/// Negotiate the application protocol version.
///
/// # Errors
///
/// - `NotSecured` if the TLS handshake has not completed
/// - `Format` if the version line does not fit its buffer (nothing is sent)
/// - `Recv` if either receive fails
/// - `HungUp` if the announcement could not be sent in full
pub fn negotiate_protocol<S: Socket>(
    conn: &mut Connection<S>,
    agent: &AgentInfo,
) -> Result<Negotiation, NegotiationError> {
    let session = conn.session_mut().ok_or(NegotiationError::NotSecured)?;

    let announcement = session.recv_line(MAX_RECV_LINE)?;
    match VersionLine::parse(&announcement) {
        Ok(server) => debug!(
            protocol = server.protocol,
            agent = %server.agent,
            version = %server.version,
            "server announced protocol"
        ),
        Err(e) => debug!(error = %e, "server announcement not understood"),
    }

    let line = agent.version_line().encode().map_err(|e| {
        error!(error = %e, "cannot format version line");
        NegotiationError::Format(e)
    })?;

    session.send(&line).map_err(|e| {
        error!(error = %e, "connection was hung up");
        NegotiationError::HungUp(e)
    })?;

    let reply = session.recv_line(MAX_RECV_LINE)?;
    let negotiation = Negotiation::from(Verdict::classify(&reply));
    if negotiation == Negotiation::Rejected {
        let reply = String::from_utf8_lossy(&reply);
        info!(
            protocol = agent.protocol,
            reply = %reply.trim_end(),
            "server did not accept protocol version"
        );
    }

    Ok(negotiation)
}
