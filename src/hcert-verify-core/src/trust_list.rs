//! Trust list: issuer signing keys by key identifier.
//!
//! Two sources implement [`TrustSource`]: the fetched [`TrustListService`]
//! (a [`SignedDataset`] of issuer certificates) and [`StaticTrustSource`]
//! (a fixed local set). The verification pipeline only sees the trait.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hcert_crypto::{KeyCertificate, VerificationKey};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{from_unix, Clock};
use crate::dataset::{decode_entry_list, DatasetCodec, SignedDataset};
use crate::error::VerifyError;
use crate::hcert::CertificateType;

/// Extended key usage: may sign test certificates.
pub const EKU_TEST: &str = "1.3.6.1.4.1.1847.2021.1.1";
/// Extended key usage: may sign vaccination certificates.
pub const EKU_VACCINATION: &str = "1.3.6.1.4.1.1847.2021.1.2";
/// Extended key usage: may sign recovery certificates.
pub const EKU_RECOVERY: &str = "1.3.6.1.4.1.1847.2021.1.3";

/// Issued-at / expires-at of the certificate being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateWindow {
    /// Certificate issuance.
    pub issued_at: DateTime<Utc>,
    /// Certificate expiry.
    pub expires_at: DateTime<Utc>,
}

/// One trusted signing key.
#[derive(Debug, Clone)]
pub struct TrustEntry {
    /// Key identifier (first bytes of the certificate hash).
    pub key_id: Vec<u8>,
    /// Public key.
    pub public_key: VerificationKey,
    /// Certificate types the key may sign; empty means all.
    pub usage_types: Vec<CertificateType>,
    /// Start of key validity.
    pub not_before: Option<DateTime<Utc>>,
    /// End of key validity.
    pub not_after: Option<DateTime<Utc>>,
}

impl TrustEntry {
    /// Build an entry from a DER X.509 signing certificate.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the certificate or its key cannot be parsed.
    pub fn from_certificate(key_id: Vec<u8>, der: &[u8]) -> Result<Self, VerifyError> {
        let cert = KeyCertificate::from_der(der)?;

        let usage_types = cert
            .extended_key_usages
            .iter()
            .filter_map(|oid| match oid.as_str() {
                EKU_TEST => Some(CertificateType::Test),
                EKU_VACCINATION => Some(CertificateType::Vaccination),
                EKU_RECOVERY => Some(CertificateType::Recovery),
                _ => None,
            })
            .collect();

        Ok(Self {
            key_id,
            public_key: cert.public_key,
            usage_types,
            not_before: Some(from_unix(cert.not_before)),
            not_after: Some(from_unix(cert.not_after)),
        })
    }

    /// Whether the key may sign `certificate_type`.
    pub fn permits(&self, certificate_type: CertificateType) -> bool {
        self.usage_types.is_empty() || self.usage_types.contains(&certificate_type)
    }

    fn check_key_window(&self, now: DateTime<Utc>) -> Result<(), VerifyError> {
        let before_start = self.not_before.is_some_and(|nb| now < nb);
        let after_end = self.not_after.is_some_and(|na| now > na);
        if before_start || after_end {
            return Err(VerifyError::KeyExpired);
        }
        Ok(())
    }

    fn check_certificate_window(&self, window: &CertificateWindow) -> Result<(), VerifyError> {
        let issued_before_key = self.not_before.is_some_and(|nb| window.issued_at < nb);
        let issued_after_key = self.not_after.is_some_and(|na| window.issued_at > na);
        let outlives_key = self.not_after.is_some_and(|na| window.expires_at > na);
        if issued_before_key || issued_after_key || outlives_key {
            return Err(VerifyError::CertificateExpired);
        }
        Ok(())
    }
}

/// Keys indexed by key identifier.
#[derive(Debug, Clone, Default)]
pub struct TrustList {
    entries: HashMap<Vec<u8>, TrustEntry>,
}

impl TrustList {
    /// Index `entries`. On duplicate key identifiers the first entry wins.
    pub fn new(entries: impl IntoIterator<Item = TrustEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            if map.contains_key(&entry.key_id) {
                warn!(key_id = %BASE64.encode(&entry.key_id), "Trust list: duplicate key id ignored");
                continue;
            }
            map.insert(entry.key_id.clone(), entry);
        }
        Self { entries: map }
    }

    /// Look up an entry.
    pub fn get(&self, key_id: &[u8]) -> Option<&TrustEntry> {
        self.entries.get(key_id)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a key, applying the key window, the usage type and (when
    /// `window` is given) the certificate-within-key-lifetime check.
    pub fn resolve(
        &self,
        key_id: &[u8],
        certificate_type: CertificateType,
        window: Option<&CertificateWindow>,
        now: DateTime<Utc>,
    ) -> Result<VerificationKey, VerifyError> {
        let entry = self.lookup(key_id)?;
        entry.check_key_window(now)?;
        check_usage(entry, certificate_type)?;
        if let Some(window) = window {
            entry.check_certificate_window(window)?;
        }
        Ok(entry.public_key.clone())
    }

    fn lookup(&self, key_id: &[u8]) -> Result<&TrustEntry, VerifyError> {
        self.get(key_id).ok_or_else(|| VerifyError::KeyNotInTrustList {
            key_id: BASE64.encode(key_id),
        })
    }
}

fn check_usage(entry: &TrustEntry, certificate_type: CertificateType) -> Result<(), VerifyError> {
    if entry.permits(certificate_type) {
        Ok(())
    } else {
        Err(VerifyError::UnsuitableKeyType {
            certificate_type: certificate_type.to_string(),
        })
    }
}

/// Resolves signing keys for the verification pipeline.
pub trait TrustSource: Send + Sync {
    /// Find the key for `key_id` that may sign a `certificate_type`
    /// certificate, optionally checking the certificate's own window
    /// against the key's lifetime. Never touches the network.
    fn resolve_key(
        &self,
        key_id: &[u8],
        certificate_type: CertificateType,
        window: Option<&CertificateWindow>,
    ) -> Result<VerificationKey, VerifyError>;
}

/// Trust list wire entry: `{"i": kid, "c": certificate DER}`.
#[derive(Debug, Deserialize)]
struct WireEntry {
    i: String,
    c: String,
}

/// Decodes `{"c": [{"i": bstr, "c": bstr}, ...]}` trust lists.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustListCodec;

impl TrustListCodec {
    fn entry(value: &Value) -> Result<TrustEntry, VerifyError> {
        let wire = WireEntry::deserialize(value).map_err(|e| VerifyError::decoding(e.to_string()))?;
        let key_id = BASE64
            .decode(&wire.i)
            .map_err(|e| VerifyError::decoding(e.to_string()))?;
        let der = BASE64
            .decode(&wire.c)
            .map_err(|e| VerifyError::decoding(e.to_string()))?;
        TrustEntry::from_certificate(key_id, &der)
    }
}

impl DatasetCodec for TrustListCodec {
    type Payload = Vec<Value>;
    type Index = TrustList;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, VerifyError> {
        decode_entry_list(bytes, "c")
    }

    fn index(&self, payload: &Vec<Value>) -> TrustList {
        let entries = payload.iter().enumerate().filter_map(|(i, value)| {
            Self::entry(value)
                .map_err(|e| warn!(entry = i, "Trust list: skipping entry: {}", e))
                .ok()
        });
        let list = TrustList::new(entries);
        debug!(keys = list.len(), total = payload.len(), "Trust list: indexed");
        list
    }

    fn is_empty(&self, payload: &Vec<Value>) -> bool {
        payload.is_empty()
    }
}

/// Fetched, signed trust list.
pub type TrustListService = SignedDataset<TrustListCodec>;

impl TrustSource for SignedDataset<TrustListCodec> {
    fn resolve_key(
        &self,
        key_id: &[u8],
        certificate_type: CertificateType,
        window: Option<&CertificateWindow>,
    ) -> Result<VerificationKey, VerifyError> {
        let list = self.cached_view()?;
        list.resolve(key_id, certificate_type, window, self.clock().now())
    }
}

impl SignedDataset<TrustListCodec> {
    /// Refresh when due, then resolve from the cache.
    ///
    /// Unlike [`TrustSource::resolve_key`] this may go to the network. A
    /// failed refresh is logged and the cached list is used while fresh.
    pub async fn resolve_key_refreshed(
        &mut self,
        key_id: &[u8],
        certificate_type: CertificateType,
        window: Option<&CertificateWindow>,
    ) -> Result<VerificationKey, VerifyError> {
        let outcome = self.refresh_if_needed(false).await;
        if let Some(e) = outcome.error {
            warn!(dataset = %self.name(), "Trust list: refresh before lookup failed: {}", e);
        }
        self.resolve_key(key_id, certificate_type, window)
    }
}

/// Fixed, locally supplied keys.
///
/// Only the key lookup and usage type are checked unless temporal checks
/// are enabled with [`StaticTrustSource::with_temporal_checks`].
pub struct StaticTrustSource {
    list: TrustList,
    clock: Arc<dyn Clock>,
    temporal_checks: bool,
}

impl StaticTrustSource {
    /// Trust exactly `entries`.
    pub fn new(entries: impl IntoIterator<Item = TrustEntry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            list: TrustList::new(entries),
            clock,
            temporal_checks: false,
        }
    }

    /// Trust the given `(key id, DER certificate)` pairs.
    ///
    /// # Errors
    ///
    /// Fails on the first certificate that cannot be parsed.
    pub fn from_certificates<'a>(
        certificates: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VerifyError> {
        let entries = certificates
            .into_iter()
            .map(|(kid, der)| TrustEntry::from_certificate(kid.to_vec(), der))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries, clock))
    }

    /// Also check key validity and certificate-within-key-lifetime.
    #[must_use]
    pub fn with_temporal_checks(mut self) -> Self {
        self.temporal_checks = true;
        self
    }
}

impl TrustSource for StaticTrustSource {
    fn resolve_key(
        &self,
        key_id: &[u8],
        certificate_type: CertificateType,
        window: Option<&CertificateWindow>,
    ) -> Result<VerificationKey, VerifyError> {
        if self.temporal_checks {
            return self
                .list
                .resolve(key_id, certificate_type, window, self.clock.now());
        }
        let entry = self.list.lookup(key_id)?;
        check_usage(entry, certificate_type)?;
        Ok(entry.public_key.clone())
    }
}
