//! RSASSA-PSS signature verification (COSE PS256).

use rsa::pss;
use rsa::signature::Verifier;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::key::VerificationKey;
use crate::signer::SignatureVerifier;
use crate::types::CoseAlgorithm;

/// RSASSA-PSS verifier with SHA-256 and a 32-byte salt.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaPssVerifier;

impl RsaPssVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for RsaPssVerifier {
    fn algorithm(&self) -> CoseAlgorithm {
        CoseAlgorithm::Ps256
    }

    fn verify(
        &self,
        public_key: &VerificationKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let VerificationKey::Rsa(key) = public_key else {
            return Err(CryptoError::KeyAlgorithmMismatch {
                key_type: public_key.key_type(),
                algorithm: CoseAlgorithm::Ps256,
            });
        };

        let vk = pss::VerifyingKey::<Sha256>::new(key.clone());
        let sig = pss::Signature::try_from(signature)
            .map_err(|e| CryptoError::invalid_signature(format!("bad PS256 signature: {e}")))?;

        Ok(vk.verify(data, &sig).is_ok())
    }
}
