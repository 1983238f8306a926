//! Verification key material.
//!
//! Keys reach the verifier in three shapes: a DER X.509 certificate (trust
//! list entries and pinned anchors), a DER SubjectPublicKeyInfo, or a raw
//! SEC1 point (locally supplied P-256 keys). All of them normalize into a
//! [`VerificationKey`].

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey as _;
use rsa::pkcs8::DecodePublicKey as _;
use rsa::RsaPublicKey;

use crate::error::CryptoError;
use crate::signer::verifier_for;
use crate::types::CoseAlgorithm;

/// A parsed public key that can check envelope signatures.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    /// NIST P-256 key (ES256).
    P256(p256::ecdsa::VerifyingKey),
    /// RSA key (PS256).
    Rsa(RsaPublicKey),
}

impl VerificationKey {
    /// Parse key material in any supported encoding.
    ///
    /// Tried in order: DER X.509 certificate, DER SubjectPublicKeyInfo,
    /// SEC1 encoded P-256 point.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if none of the encodings match.
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::invalid_public_key("empty key material"));
        }

        if let Ok((_, cert)) = x509_parser::parse_x509_certificate(bytes) {
            return Self::from_spki_der(cert.tbs_certificate.subject_pki.raw);
        }

        if let Ok(key) = Self::from_spki_der(bytes) {
            return Ok(key);
        }

        Self::from_sec1(bytes)
    }

    /// Parse a DER SubjectPublicKeyInfo (P-256 or RSA).
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if the SPKI holds neither key type.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(pk) = p256::PublicKey::from_public_key_der(der) {
            let point = pk.to_encoded_point(false);
            let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())
                .map_err(|e| CryptoError::invalid_public_key(format!("bad P-256 key: {e}")))?;
            return Ok(Self::P256(vk));
        }

        RsaPublicKey::from_public_key_der(der)
            .map(Self::Rsa)
            .map_err(|e| CryptoError::invalid_public_key(format!("unsupported SPKI: {e}")))
    }

    /// Parse a SEC1 encoded P-256 point (compressed or uncompressed).
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if the bytes are not a valid point.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(Self::P256)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))
    }

    /// Short name of the key family.
    #[must_use]
    pub fn key_type(&self) -> &'static str {
        match self {
            Self::P256(_) => "EC P-256",
            Self::Rsa(_) => "RSA",
        }
    }

    /// Verify `signature` over `data` using `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns `VerificationFailed` if the signature does not match, or a
    /// format error if the signature or key cannot be used with `algorithm`.
    pub fn verify(
        &self,
        algorithm: CoseAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        if verifier_for(algorithm).verify(self, data, signature)? {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}
