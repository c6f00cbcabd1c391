//! Server certificate verification hook.
//!
//! Trust in the server is decided after the handshake, once the caller can
//! match the presented key against its own per-host records. At the TLS layer
//! every certificate is accepted. Handshake signatures are still verified, so
//! the server has proven it holds the private key of the certificate it sent.

use std::sync::Arc;

use rustls::{
    DigitallySignedStruct, Error, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};

/// Accepts any server certificate and defers the trust decision.
#[derive(Debug)]
pub struct DeferredTrustVerifier {
    provider: Arc<CryptoProvider>,
}

impl DeferredTrustVerifier {
    /// Verifier checking handshake signatures with `provider`'s algorithms.
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for DeferredTrustVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        certificate::{CertificateFactory, SelfSignedCertificates},
        keys::HostKeyPair,
    };

    #[test]
    fn accepts_any_certificate() {
        let verifier =
            DeferredTrustVerifier::new(Arc::new(rustls::crypto::ring::default_provider()));
        let keys = HostKeyPair::generate().unwrap();
        let cert = SelfSignedCertificates::default().certificate_for(&keys).unwrap();
        let name = ServerName::try_from("unrelated.example").unwrap();

        let result = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
    }

    #[test]
    fn advertises_provider_schemes() {
        let verifier =
            DeferredTrustVerifier::new(Arc::new(rustls::crypto::ring::default_provider()));
        assert!(verifier.supported_verify_schemes().contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
    }
}
