//! # hcert-crypto
//!
//! Signature primitives for health certificate verification.
//!
//! Certificates and the signed datasets that back them (trust lists,
//! business rules, value sets) are all protected by COSE_Sign1 envelopes.
//! This crate provides the pieces needed to check those envelopes:
//!
//! - **Algorithms**: ES256 (ECDSA P-256 / SHA-256) and PS256 (RSASSA-PSS / SHA-256)
//! - **Key material**: X.509 DER certificates, DER SubjectPublicKeyInfo, SEC1 points
//! - **Key certificates**: validity window and extended key usage inspection
//!
//! ```text
//! VerificationKey::parse(bytes) ──► VerificationKey::verify(alg, sig_structure, signature)
//!                                          │
//!                                          ├── P256Verifier   (ES256)
//!                                          └── RsaPssVerifier (PS256)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod certificate;
mod ecdsa;
mod error;
mod key;
mod rsa_pss;
mod signer;
mod types;

pub use certificate::KeyCertificate;
pub use ecdsa::{P256Signer, P256Verifier};
pub use error::CryptoError;
pub use key::VerificationKey;
pub use rsa_pss::RsaPssVerifier;
pub use signer::{verifier_for, EnvelopeSigner, SignatureVerifier};
pub use types::CoseAlgorithm;

/// Constant-time byte comparison.
///
/// Used for every comparison of hashes or key identifiers derived from
/// untrusted input.
///
/// Uses the `subtle` crate's `ConstantTimeEq` trait for the comparison.
/// The length check still returns early, but length is typically not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
