//! ECDSA P-256 signature operations (COSE ES256).
//!
//! COSE carries ECDSA signatures as the raw `r || s` concatenation, which is
//! what both the signer and the verifier here produce and expect.

use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey,
};
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::DecodePrivateKey;

use crate::error::CryptoError;
use crate::key::VerificationKey;
use crate::signer::{EnvelopeSigner, SignatureVerifier};
use crate::types::CoseAlgorithm;

/// ECDSA P-256 signer.
pub struct P256Signer {
    signing_key: SigningKey,
}

impl P256Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Create a signer from a raw 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Create a signer from a PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a P-256 PKCS#8 key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Get the verification key matching this signer.
    #[must_use]
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey::P256(self.signing_key.verifying_key().clone())
    }
}

impl EnvelopeSigner for P256Signer {
    fn algorithm(&self) -> CoseAlgorithm {
        CoseAlgorithm::Es256
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let vk = self.signing_key.verifying_key();
        let encoded = vk.to_encoded_point(false); // Uncompressed
        Ok(encoded.as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA P-256 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Verifier;

impl P256Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for P256Verifier {
    fn algorithm(&self) -> CoseAlgorithm {
        CoseAlgorithm::Es256
    }

    fn verify(
        &self,
        public_key: &VerificationKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let VerificationKey::P256(vk) = public_key else {
            return Err(CryptoError::KeyAlgorithmMismatch {
                key_type: public_key.key_type(),
                algorithm: CoseAlgorithm::Es256,
            });
        };

        let sig = Signature::from_slice(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(vk.verify(data, &sig).is_ok())
    }
}
