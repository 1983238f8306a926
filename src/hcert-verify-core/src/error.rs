//! Error types for certificate verification and dataset maintenance.

use thiserror::Error;

/// Errors that can occur while decoding, verifying or evaluating a
/// certificate, or while refreshing a signed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Input does not start with an accepted scheme prefix.
    #[error("Invalid scheme prefix")]
    InvalidSchemePrefix,

    /// Base45 text could not be decoded.
    #[error("Base45 decoding failed: {reason}")]
    Base45DecodingFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Compressed stream is malformed or too large.
    #[error("Decompression failed: {reason}")]
    DecompressionFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Signed envelope could not be parsed or lacks a key identifier.
    #[error("Envelope deserialization failed: {reason}")]
    EnvelopeDeserializationFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Timed claims or certificate body could not be parsed.
    #[error("Claims deserialization failed: {reason}")]
    ClaimsDeserializationFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Envelope signature does not verify.
    #[error("Signature invalid: {reason}")]
    SignatureInvalid {
        /// Reason for failure.
        reason: String,
    },

    /// Signing key is not permitted for this certificate type.
    #[error("Unsuitable key type: key may not sign {certificate_type} certificates")]
    UnsuitableKeyType {
        /// Certificate type the key was asked to cover.
        certificate_type: String,
    },

    /// Key identifier is absent from the trust source.
    #[error("Key not in trust list: {key_id}")]
    KeyNotInTrustList {
        /// Base64 key identifier.
        key_id: String,
    },

    /// Signing key is outside its own validity window.
    #[error("Key expired")]
    KeyExpired,

    /// Certificate is outside its validity window, or outlives its key.
    #[error("Certificate expired")]
    CertificateExpired,

    /// Signed dataset envelope is not valid yet.
    #[error("Not yet valid")]
    NotYetValid,

    /// Signed dataset envelope has expired.
    #[error("Expired")]
    Expired,

    /// Cached dataset is older than its maximum age.
    #[error("Data expired: {dataset} is stale")]
    DataExpired {
        /// Dataset name.
        dataset: String,
    },

    /// Transport failure or non-200 response.
    #[error("Service error: {message}")]
    ServiceError {
        /// Error message.
        message: String,
    },

    /// Dataset payload or signature could not be decoded.
    #[error("Decoding failed: {reason}")]
    DecodingFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Persistent store failure.
    #[error("Storage error: {message}")]
    StorageError {
        /// Error message.
        message: String,
    },

    /// Sealing or unsealing persisted data failed.
    #[error("Encryption error: {message}")]
    EncryptionError {
        /// Error message.
        message: String,
    },

    /// Rule engine could not evaluate a rule.
    #[error("Rule evaluation failed: {reason}")]
    RuleEvaluationFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message.
        message: String,
    },

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    CryptoError(#[from] hcert_crypto::CryptoError),
}

impl VerifyError {
    /// Create a base45 decoding error.
    pub fn base45(reason: impl Into<String>) -> Self {
        Self::Base45DecodingFailed {
            reason: reason.into(),
        }
    }

    /// Create a decompression error.
    pub fn decompression(reason: impl Into<String>) -> Self {
        Self::DecompressionFailed {
            reason: reason.into(),
        }
    }

    /// Create an envelope deserialization error.
    pub fn envelope(reason: impl Into<String>) -> Self {
        Self::EnvelopeDeserializationFailed {
            reason: reason.into(),
        }
    }

    /// Create a claims deserialization error.
    pub fn claims(reason: impl Into<String>) -> Self {
        Self::ClaimsDeserializationFailed {
            reason: reason.into(),
        }
    }

    /// Create a signature error.
    pub fn signature_invalid(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            reason: reason.into(),
        }
    }

    /// Create a dataset decoding error.
    pub fn decoding(reason: impl Into<String>) -> Self {
        Self::DecodingFailed {
            reason: reason.into(),
        }
    }

    /// Create a service error.
    pub fn service(message: impl Into<String>) -> Self {
        Self::ServiceError {
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    /// Check if this error is about time: key, certificate, envelope or
    /// dataset validity.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::KeyExpired
                | Self::CertificateExpired
                | Self::NotYetValid
                | Self::Expired
                | Self::DataExpired { .. }
        )
    }

    /// Check if this error means the signer could not be trusted.
    #[must_use]
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid { .. }
                | Self::UnsuitableKeyType { .. }
                | Self::KeyNotInTrustList { .. }
                | Self::CryptoError(_)
        )
    }

    /// Check if this error happened before any trust decision was made.
    #[must_use]
    pub fn is_decoding_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchemePrefix
                | Self::Base45DecodingFailed { .. }
                | Self::DecompressionFailed { .. }
                | Self::EnvelopeDeserializationFailed { .. }
                | Self::ClaimsDeserializationFailed { .. }
                | Self::DecodingFailed { .. }
        )
    }
}
