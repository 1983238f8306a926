//! Signer and verifier traits.

use crate::ecdsa::P256Verifier;
use crate::error::CryptoError;
use crate::key::VerificationKey;
use crate::rsa_pss::RsaPssVerifier;
use crate::types::CoseAlgorithm;

/// Produces envelope signatures.
///
/// Only used to build envelopes (fixtures, tooling); verification never
/// needs a signer.
pub trait EnvelopeSigner {
    /// Get the algorithm used by this signer.
    fn algorithm(&self) -> CoseAlgorithm;

    /// Get the public key (SEC1 uncompressed point for EC keys).
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign data and return the signature in COSE encoding.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Checks envelope signatures for one algorithm.
pub trait SignatureVerifier {
    /// The algorithm this verifier implements.
    fn algorithm(&self) -> CoseAlgorithm;

    /// Verify a signature against a public key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match,
    /// and an error when the key or signature cannot be used at all.
    fn verify(
        &self,
        public_key: &VerificationKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError>;
}

/// Select the verifier for a COSE algorithm.
#[must_use]
pub fn verifier_for(algorithm: CoseAlgorithm) -> &'static dyn SignatureVerifier {
    static P256: P256Verifier = P256Verifier;
    static RSA_PSS: RsaPssVerifier = RsaPssVerifier;

    match algorithm {
        CoseAlgorithm::Es256 => &P256,
        CoseAlgorithm::Ps256 => &RSA_PSS,
    }
}
