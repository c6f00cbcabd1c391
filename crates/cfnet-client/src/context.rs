//! TLS client context.
//!
//! Holds the `rustls` configuration shared by every outbound connection:
//! protocol versions, client certificate and key, and the verification hook.
//!
//! # Lifecycle
//!
//! ```text
//! ┌───────────────┐  initialize()  ┌─────────────┐
//! │ Uninitialized │───────────────>│ Initialized │──┐ initialize(): no-op
//! └───────────────┘                └─────────────┘<─┘
//!         ^                               │
//!         └────────── teardown() ─────────┘
//! ```
//!
//! A failed `initialize` leaves the context uninitialized with nothing
//! half-built: the new state is assembled in locals and only stored once
//! every step has succeeded. Initialization is retried later, typically by
//! the next connection attempt, since keys may be created after startup.
//!
//! Sessions hold their own `Arc` to the configuration, so `teardown` does not
//! affect connections that are already established.

use std::sync::Arc;

use rustls::{
    SupportedProtocolVersion,
    crypto::CryptoProvider,
    pki_types::CertificateDer,
    sign::CertifiedKey,
};
use tracing::{debug, error, warn};

use crate::{
    certificate::{CertificateFactory, SelfSignedCertificates},
    error::ContextError,
    keys::{HostKeyPair, KeyStore},
    verifier::DeferredTrustVerifier,
};

/// Lowest TLS version the client will negotiate.
///
/// SSL and TLS 1.0/1.1 are never offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2 and 1.3
    #[default]
    Tls12,
    /// TLS 1.3 only
    Tls13,
}

static TLS12_AND_LATER: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

impl TlsVersion {
    fn versions(self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            Self::Tls12 => TLS12_AND_LATER,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

/// Context configuration
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Minimum protocol version offered to servers
    pub min_tls_version: TlsVersion,
}

#[derive(Debug)]
struct Initialized {
    tls: Arc<rustls::ClientConfig>,
    certificate: CertificateDer<'static>,
    keys: Arc<HostKeyPair>,
}

/// TLS client context.
///
/// Generic over the key store and the certificate factory so tests can
/// substitute either collaborator.
#[derive(Debug)]
pub struct ClientContext<K, C = SelfSignedCertificates> {
    keys: K,
    certificates: C,
    config: ContextConfig,
    state: Option<Initialized>,
}

impl<K: KeyStore> ClientContext<K> {
    /// Create an uninitialized context issuing self-signed certificates.
    pub fn new(keys: K, config: ContextConfig) -> Self {
        Self::with_certificates(keys, SelfSignedCertificates::default(), config)
    }
}

impl<K: KeyStore, C: CertificateFactory> ClientContext<K, C> {
    /// Create an uninitialized context with a custom certificate factory.
    pub fn with_certificates(keys: K, certificates: C, config: ContextConfig) -> Self {
        Self { keys, certificates, config, state: None }
    }

    /// Initialize the context.
    ///
    /// Idempotent: once initialized, further calls return `Ok(())` without
    /// touching the key store or rebuilding anything.
    ///
    /// # Errors
    ///
    /// - `MissingKeys` if no key pair is available even after a reload
    /// - `Certificate` if the certificate cannot be generated
    /// - `UnsupportedKey` / `InconsistentKeys` if certificate and key cannot
    ///   be bound together
    /// - `Tls` if rustls rejects the configuration
    ///
    /// On error the context stays uninitialized.
    pub fn initialize(&mut self) -> Result<(), ContextError> {
        if self.state.is_some() {
            return Ok(());
        }

        let state = self.build()?;
        debug!(
            min_tls_version = ?self.config.min_tls_version,
            "TLS client context initialized"
        );
        self.state = Some(state);
        Ok(())
    }

    /// Drop the certificate and configuration.
    ///
    /// Safe to call when not initialized. A later `initialize` starts over,
    /// picking up whatever keys are loaded by then.
    pub fn teardown(&mut self) {
        if self.state.take().is_some() {
            debug!("TLS client context torn down");
        }
    }

    /// Whether `initialize` has succeeded since the last teardown.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Shared rustls configuration for new sessions.
    pub fn tls_config(&self) -> Result<Arc<rustls::ClientConfig>, ContextError> {
        self.state.as_ref().map(|s| Arc::clone(&s.tls)).ok_or(ContextError::NotInitialized)
    }

    /// Certificate presented to servers, once initialized.
    pub fn certificate(&self) -> Option<&CertificateDer<'static>> {
        self.state.as_ref().map(|s| &s.certificate)
    }

    /// Key pair bound into the configuration, once initialized.
    pub fn host_keys(&self) -> Option<&Arc<HostKeyPair>> {
        self.state.as_ref().map(|s| &s.keys)
    }

    /// The key store this context draws keys from.
    pub fn key_store(&self) -> &K {
        &self.keys
    }

    /// Context configuration.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn build(&self) -> Result<Initialized, ContextError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(self.config.min_tls_version.versions())
            .map_err(|e| {
                error!(error = %e, "failed to select TLS protocol versions");
                ContextError::Tls(e)
            })?;

        let keys = self.load_keys()?;

        let certificate = self.certificates.certificate_for(&keys).map_err(|e| {
            error!(error = %e, "failed to generate in-memory certificate from private key");
            ContextError::from(e)
        })?;

        check_key_consistency(&provider, &certificate, &keys)?;

        let tls = builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DeferredTrustVerifier::new(provider)))
            .with_client_auth_cert(vec![certificate.clone()], keys.private_key())
            .map_err(|e| {
                error!(error = %e, "failed to bind client certificate");
                ContextError::Tls(e)
            })?;

        Ok(Initialized { tls: Arc::new(tls), certificate, keys })
    }

    fn load_keys(&self) -> Result<Arc<HostKeyPair>, ContextError> {
        if let Some(keys) = self.keys.current() {
            return Ok(keys);
        }

        warn!("no public/private key pair is loaded, trying to reload");
        if let Err(e) = self.keys.reload() {
            debug!(error = %e, "key reload failed");
        }

        self.keys.current().ok_or_else(|| {
            warn!("no public/private key pair found");
            ContextError::MissingKeys
        })
    }
}

fn check_key_consistency(
    provider: &CryptoProvider,
    certificate: &CertificateDer<'static>,
    keys: &HostKeyPair,
) -> Result<(), ContextError> {
    let signing_key = provider.key_provider.load_private_key(keys.private_key()).map_err(|e| {
        error!(error = %e, "failed to use private key");
        ContextError::UnsupportedKey(e)
    })?;

    CertifiedKey::new(vec![certificate.clone()], signing_key).keys_match().map_err(|e| {
        error!(error = %e, "inconsistent key and TLS certificate");
        ContextError::InconsistentKeys(e)
    })
}
