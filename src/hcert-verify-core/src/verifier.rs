//! Certificate verification pipeline.
//!
//! ```text
//! "HC1:..." ─► strip prefix ─► base45 ─► zlib ─► COSE_Sign1 ─► CWT + hcert
//!           ─► type check ─► resolve key ─► verify signature ─► iat/exp
//! ```
//!
//! Every stage is terminal on failure. Structural failures (up to and
//! including the type check) yield a verdict with no metadata; failures
//! from key resolution onwards keep the decoded metadata and claims so a
//! caller can show them as unverified.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::clock::{from_unix, Clock};
use crate::codec::{base45_decode, zlib_decompress};
use crate::cose::CoseSign1;
use crate::cwt::CwtClaims;
use crate::error::VerifyError;
use crate::hcert::{CertificateClaims, CertificateType};
use crate::trust_list::{CertificateWindow, TrustSource};

/// Prefix of standard (vaccination, test, recovery) certificates.
pub const STANDARD_PREFIX: &str = "HC1:";
/// Prefix of exemption certificates.
pub const EXEMPTION_PREFIX: &str = "AT1:";

/// Which certificate family an input is read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CertificateScheme {
    /// `HC1:` certificates.
    Standard,
    /// `AT1:` certificates.
    Exemption,
}

impl CertificateScheme {
    /// Scheme prefix, matched byte for byte.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Standard => STANDARD_PREFIX,
            Self::Exemption => EXEMPTION_PREFIX,
        }
    }

    fn admits(self, certificate_type: CertificateType) -> bool {
        match self {
            Self::Standard => certificate_type != CertificateType::Exemption,
            Self::Exemption => certificate_type == CertificateType::Exemption,
        }
    }
}

/// Envelope metadata of a decoded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateMeta {
    /// Issuing country.
    pub issuer: Option<String>,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Signing key identifier.
    #[serde(serialize_with = "as_base64")]
    pub key_id: Vec<u8>,
}

impl CertificateMeta {
    fn window(&self) -> CertificateWindow {
        CertificateWindow {
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// A certificate that passed the structural stages but whose signature has
/// not been checked.
#[derive(Debug, Clone)]
pub struct DecodedCertificate {
    /// Scheme the input was read as.
    pub scheme: CertificateScheme,
    /// Signed envelope.
    pub envelope: CoseSign1,
    /// Envelope metadata.
    pub meta: CertificateMeta,
    /// Certificate body.
    pub claims: CertificateClaims,
}

/// Outcome of verifying one certificate.
///
/// Exactly one of `is_valid` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationVerdict {
    /// Whether every stage passed.
    pub is_valid: bool,
    /// Metadata, when decoding got far enough.
    pub meta: Option<CertificateMeta>,
    /// Claims, when decoding got far enough.
    pub claims: Option<CertificateClaims>,
    /// First failure.
    #[serde(serialize_with = "error_message")]
    pub error: Option<VerifyError>,
}

impl ValidationVerdict {
    fn valid(decoded: DecodedCertificate) -> Self {
        Self {
            is_valid: true,
            meta: Some(decoded.meta),
            claims: Some(decoded.claims),
            error: None,
        }
    }

    fn structural_failure(error: VerifyError) -> Self {
        Self {
            is_valid: false,
            meta: None,
            claims: None,
            error: Some(error),
        }
    }

    fn unverified(decoded: DecodedCertificate, error: VerifyError) -> Self {
        Self {
            is_valid: false,
            meta: Some(decoded.meta),
            claims: Some(decoded.claims),
            error: Some(error),
        }
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn error_message<S: Serializer>(error: &Option<VerifyError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Run the structural stages: prefix, Base45, zlib, envelope, claims and
/// the record-type check.
///
/// # Errors
///
/// Returns the error of the first failing stage.
pub fn decode_certificate(
    input: &str,
    scheme: CertificateScheme,
) -> Result<DecodedCertificate, VerifyError> {
    let encoded = input
        .strip_prefix(scheme.prefix())
        .ok_or(VerifyError::InvalidSchemePrefix)?;

    let compressed = base45_decode(encoded)?;
    let cose = zlib_decompress(&compressed)?;

    let envelope = CoseSign1::parse(&cose)?;
    let key_id = envelope
        .key_id
        .clone()
        .ok_or_else(|| VerifyError::envelope("no key identifier in envelope headers"))?;

    let cwt = CwtClaims::parse(&envelope.payload).map_err(VerifyError::claims)?;
    let issued_at = cwt
        .issued_at
        .ok_or_else(|| VerifyError::claims("missing issued-at claim"))?;
    let expires_at = cwt
        .expires_at
        .ok_or_else(|| VerifyError::claims("missing expiry claim"))?;
    let body = cwt
        .hcert
        .ok_or_else(|| VerifyError::claims("missing health certificate claim"))?;
    let claims = CertificateClaims::from_value(body)?;

    let certificate_type = claims.certificate_type();
    if !scheme.admits(certificate_type) {
        return Err(VerifyError::claims(format!(
            "{certificate_type} certificate under {} prefix",
            scheme.prefix()
        )));
    }

    debug!(
        kid = %BASE64.encode(&key_id),
        certificate_type = %certificate_type,
        "Verifier: certificate decoded"
    );

    Ok(DecodedCertificate {
        scheme,
        meta: CertificateMeta {
            issuer: cwt.issuer,
            issued_at: from_unix(issued_at),
            expires_at: from_unix(expires_at),
            key_id,
        },
        envelope,
        claims,
    })
}

/// Decode without verifying, trying the standard prefix first and the
/// exemption prefix second.
///
/// # Errors
///
/// Returns the exemption path's error, or the standard path's when the
/// input carries neither prefix.
pub fn decode_any(input: &str) -> Result<DecodedCertificate, VerifyError> {
    match decode_certificate(input, CertificateScheme::Standard) {
        Ok(decoded) => Ok(decoded),
        Err(standard) => match decode_certificate(input, CertificateScheme::Exemption) {
            Ok(decoded) => Ok(decoded),
            Err(VerifyError::InvalidSchemePrefix) => Err(standard),
            Err(exemption) => Err(exemption),
        },
    }
}

/// Verifies certificates against a [`TrustSource`].
#[derive(Clone)]
pub struct CertificateVerifier {
    clock: Arc<dyn Clock>,
}

impl CertificateVerifier {
    /// Verifier whose temporal check uses `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run the full pipeline. Never performs network I/O.
    #[instrument(skip(self, input, trust))]
    pub fn verify(
        &self,
        input: &str,
        scheme: CertificateScheme,
        trust: &dyn TrustSource,
    ) -> ValidationVerdict {
        let decoded = match decode_certificate(input, scheme) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "Verifier: certificate rejected before key lookup");
                return ValidationVerdict::structural_failure(e);
            },
        };

        if let Err(e) = self.check(&decoded, trust) {
            warn!(error = %e, "Verifier: certificate not valid");
            return ValidationVerdict::unverified(decoded, e);
        }

        info!(
            issuer = ?decoded.meta.issuer,
            certificate_type = %decoded.claims.certificate_type(),
            "Verifier: certificate valid"
        );
        ValidationVerdict::valid(decoded)
    }

    fn check(&self, decoded: &DecodedCertificate, trust: &dyn TrustSource) -> Result<(), VerifyError> {
        let key = trust.resolve_key(
            &decoded.meta.key_id,
            decoded.claims.certificate_type(),
            Some(&decoded.meta.window()),
        )?;

        decoded.envelope.verify(&key)?;

        let now = self.clock.now();
        if now < decoded.meta.issued_at || now > decoded.meta.expires_at {
            return Err(VerifyError::CertificateExpired);
        }
        Ok(())
    }
}
