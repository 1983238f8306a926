//! Algorithm identifiers.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// COSE signature algorithm (RFC 9053 registry values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum CoseAlgorithm {
    /// ECDSA with NIST P-256 and SHA-256.
    Es256 = -7,

    /// RSASSA-PSS with SHA-256 and MGF1-SHA-256.
    Ps256 = -37,
}

impl CoseAlgorithm {
    /// Map a COSE `alg` header value to an algorithm.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for any other registry value.
    pub fn from_cose_value(value: i64) -> Result<Self, CryptoError> {
        match value {
            -7 => Ok(Self::Es256),
            -37 => Ok(Self::Ps256),
            other => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: format!("COSE alg {other}"),
            }),
        }
    }

    /// COSE registry value of this algorithm.
    #[must_use]
    pub const fn cose_value(&self) -> i64 {
        *self as i64
    }

    /// OID of the signature algorithm (for X.509/PKCS).
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::Es256 => "1.2.840.10045.4.3.2", // ecdsa-with-SHA256
            Self::Ps256 => "1.2.840.113549.1.1.10", // id-RSASSA-PSS
        }
    }
}
