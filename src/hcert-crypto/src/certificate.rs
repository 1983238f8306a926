//! X.509 key certificate inspection.
//!
//! Trust list entries ship their public key wrapped in an X.509 certificate.
//! The certificate contributes three things: the key itself, its validity
//! window, and the extended key usage OIDs that restrict which kind of
//! health certificate the key may sign.

use x509_parser::prelude::*;

use crate::error::CryptoError;
use crate::key::VerificationKey;

/// Public key plus the constraints carried by its certificate.
#[derive(Debug, Clone)]
pub struct KeyCertificate {
    /// Parsed public key.
    pub public_key: VerificationKey,
    /// Start of validity (Unix seconds).
    pub not_before: i64,
    /// End of validity (Unix seconds).
    pub not_after: i64,
    /// Extended key usage OIDs in dotted form, excluding the well-known
    /// TLS/code-signing purposes.
    pub extended_key_usages: Vec<String>,
}

impl KeyCertificate {
    /// Parse a DER X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCertificate` if the DER is malformed or trailing data
    /// follows it, and `InvalidPublicKey` if the key type is unsupported.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (rest, cert) = parse_x509_certificate(der)
            .map_err(|e| CryptoError::invalid_certificate(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CryptoError::invalid_certificate(
                "trailing bytes after certificate",
            ));
        }

        let public_key = VerificationKey::from_spki_der(cert.tbs_certificate.subject_pki.raw)?;

        let extended_key_usages = match cert.extended_key_usage() {
            Ok(Some(eku)) => eku
                .value
                .other
                .iter()
                .map(|oid| oid.to_id_string())
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => return Err(CryptoError::invalid_certificate(e.to_string())),
        };

        Ok(Self {
            public_key,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            extended_key_usages,
        })
    }

    /// Whether `unix_time` lies inside the certificate validity window.
    #[must_use]
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }
}
