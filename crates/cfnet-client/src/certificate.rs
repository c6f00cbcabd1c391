//! Client certificate synthesis.
//!
//! The client has no CA-issued certificate. Servers identify it by its public
//! key, so a self-signed certificate wrapping the host key is enough to carry
//! that key through the TLS handshake.

use rustls::pki_types::CertificateDer;

use crate::{error::CertificateError, keys::HostKeyPair};

/// Produces the certificate the client presents during the handshake.
pub trait CertificateFactory {
    /// Build a certificate for the public half of `keys`, signed with the
    /// private half.
    fn certificate_for(&self, keys: &HostKeyPair) -> Result<CertificateDer<'static>, CertificateError>;
}

/// Self-signed certificates with a fixed common name.
#[derive(Debug, Clone)]
pub struct SelfSignedCertificates {
    common_name: String,
}

impl SelfSignedCertificates {
    /// Factory issuing certificates for `common_name`.
    pub fn new(common_name: impl Into<String>) -> Self {
        Self { common_name: common_name.into() }
    }

    /// Common name written into every certificate.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }
}

impl Default for SelfSignedCertificates {
    fn default() -> Self {
        Self::new("cfengine")
    }
}

impl CertificateFactory for SelfSignedCertificates {
    fn certificate_for(&self, keys: &HostKeyPair) -> Result<CertificateDer<'static>, CertificateError> {
        let key_pair = rcgen::KeyPair::try_from(keys.pkcs8_der()).map_err(CertificateError::Key)?;

        let mut params =
            rcgen::CertificateParams::new(Vec::<String>::new()).map_err(CertificateError::Generate)?;
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.distinguished_name.push(rcgen::DnType::CommonName, self.common_name.as_str());

        let certificate = params.self_signed(&key_pair).map_err(CertificateError::Generate)?;
        Ok(certificate.der().clone())
    }
}
