//! Full client-side establishment flow.
//!
//! Strings the stages together the way an agent opens a connection:
//!
//! 1. initialize the context if needed (keys may have appeared since
//!    startup)
//! 2. TLS handshake
//! 3. version negotiation
//! 4. identity announcement, only if the version was accepted
//!
//! Trust in the server is not decided here. The returned
//! [`Established::peer`] carries what the caller needs to decide it.

use tracing::{debug, info};

use crate::{
    certificate::CertificateFactory,
    connection::Connection,
    context::ClientContext,
    error::EstablishError,
    handshake::{self, HandshakeConfig, HandshakeOutcome, UnverifiedPeer},
    identity,
    keys::KeyStore,
    negotiate::{self, AgentInfo, Negotiation},
    transport::Socket,
};

/// Protocol identifier of the TLS-based protocol.
pub const TLS_PROTOCOL_ID: u32 = 2;

/// Establishment configuration
#[derive(Debug, Clone)]
pub struct EstablishConfig {
    /// Handshake settings
    pub handshake: HandshakeConfig,
    /// Version line contents
    pub agent: AgentInfo,
    /// Username announced after a successful negotiation
    pub username: Option<String>,
}

impl Default for EstablishConfig {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            agent: AgentInfo::new(
                TLS_PROTOCOL_ID,
                cfnet_proto::DEFAULT_AGENT_TAG,
                env!("CARGO_PKG_VERSION"),
            ),
            username: None,
        }
    }
}

/// A connection that completed the establishment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the server certificate must still be checked for trust"]
pub struct Established {
    /// What the server presented, or `None` if the connection was already
    /// secured before this call.
    pub peer: Option<UnverifiedPeer>,
    /// Server verdict on the announced version. Identity is only sent when
    /// this is [`Negotiation::Accepted`].
    pub negotiation: Negotiation,
}

/// Run the full client flow on `conn`.
///
/// A rejected version is returned as `Ok` with
/// [`Negotiation::Rejected`]; the TLS session stays open and the caller
/// decides whether to close it and fall back.
pub fn establish<S, K, C>(
    conn: &mut Connection<S>,
    ctx: &mut ClientContext<K, C>,
    config: &EstablishConfig,
) -> Result<Established, EstablishError>
where
    S: Socket,
    K: KeyStore,
    C: CertificateFactory,
{
    ctx.initialize()?;

    let peer = match handshake::initiate(conn, ctx, &config.handshake)? {
        HandshakeOutcome::Established(peer) => Some(peer),
        HandshakeOutcome::AlreadySecured => None,
    };

    let negotiation = negotiate::negotiate_protocol(conn, &config.agent)?;
    match negotiation {
        Negotiation::Accepted => {
            debug!(protocol = config.agent.protocol, "protocol version accepted");
            identity::send_identity(conn, config.username.as_deref())?;
        },
        Negotiation::Rejected => {
            info!("skipping identity announcement, version was not accepted");
        },
    }

    Ok(Established { peer, negotiation })
}
