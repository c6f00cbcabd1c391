//! cfnet probe.
//!
//! Connects to a server, runs the TLS handshake, negotiates the protocol
//! version and announces an identity, logging each step. Exits 0 when the
//! server accepts the version, 2 when it declines, 1 on any error.
//!
//! ```text
//! RUST_LOG=debug cfnet-probe --server policyhub:5308 --username root
//! ```

use std::{net::TcpStream, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use cfnet_client::{
    AgentInfo, ClientContext, Connection, ContextConfig, EstablishConfig, EstablishError,
    HandshakeConfig, HostKeyPair, KeyError, KeyStore, MemoryKeyStore, Negotiation, PemKeyStore,
    TLS_PROTOCOL_ID, TlsVersion, establish,
};
use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cfnet-probe")]
#[command(about = "Open a cfnet TLS connection and report how far it gets")]
struct Args {
    /// Server address
    #[arg(short, long)]
    server: String,

    /// PKCS#8 PEM private key. A throwaway key is generated if omitted.
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Protocol version to announce
    #[arg(long, default_value_t = TLS_PROTOCOL_ID)]
    protocol: u32,

    /// Software tag to announce
    #[arg(long, default_value = cfnet_client::DEFAULT_AGENT_TAG)]
    agent: String,

    /// Username for the identity line
    #[arg(short, long)]
    username: Option<String>,

    /// Refuse TLS 1.2
    #[arg(long)]
    tls13_only: bool,

    /// Seconds to wait for writability before the handshake retry
    #[arg(long, default_value_t = 10)]
    retry_wait_secs: u64,
}

#[derive(Error, Debug)]
enum ProbeError {
    #[error("key setup failed: {0}")]
    Keys(#[from] KeyError),

    #[error("cannot connect to {server}: {source}")]
    Connect { server: String, source: std::io::Error },

    #[error(transparent)]
    Establish(#[from] EstablishError),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(Negotiation::Accepted) => ExitCode::SUCCESS,
        Ok(Negotiation::Rejected) => ExitCode::from(2),
        Err(e) => {
            error!(error = %e, "probe failed");
            ExitCode::FAILURE
        },
    }
}

fn run(args: &Args) -> Result<Negotiation, ProbeError> {
    let keys: Arc<dyn KeyStore> = match &args.key {
        Some(path) => Arc::new(PemKeyStore::new(path)),
        None => {
            warn!("no key given, using a throwaway key pair");
            Arc::new(MemoryKeyStore::with_keys(HostKeyPair::generate()?))
        },
    };

    let min_tls_version = if args.tls13_only { TlsVersion::Tls13 } else { TlsVersion::Tls12 };
    let mut ctx = ClientContext::new(keys, ContextConfig { min_tls_version });

    let config = EstablishConfig {
        handshake: HandshakeConfig {
            retry_wait: Duration::from_secs(args.retry_wait_secs),
            ..HandshakeConfig::default()
        },
        agent: AgentInfo::new(args.protocol, args.agent.clone(), env!("CARGO_PKG_VERSION")),
        username: args.username.clone(),
    };

    let socket = TcpStream::connect(&args.server)
        .map_err(|source| ProbeError::Connect { server: args.server.clone(), source })?;
    info!(server = %args.server, "connected");

    let mut conn = Connection::new(socket);
    let result = establish(&mut conn, &mut ctx, &config);
    conn.close();
    let established = result?;

    if let Some(peer) = &established.peer {
        info!(
            tls_version = ?peer.tls_version,
            cipher = ?peer.cipher_suite,
            chain_len = peer.certificates.len(),
            "server certificate received, not verified"
        );
    }
    match established.negotiation {
        Negotiation::Accepted => info!(protocol = args.protocol, "server accepted protocol version"),
        Negotiation::Rejected => warn!(protocol = args.protocol, "server rejected protocol version"),
    }

    Ok(established.negotiation)
}
