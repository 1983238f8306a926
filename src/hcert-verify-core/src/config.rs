//! Configuration for the verification engine.

use std::path::PathBuf;
use std::time::Duration;

use hcert_crypto::VerificationKey;

use crate::error::VerifyError;

/// Where a signed dataset is published and how often it is refreshed.
#[derive(Debug, Clone)]
pub struct DatasetSource {
    /// Dataset name; also the storage key and the encryption alias.
    pub name: String,
    /// Payload endpoint.
    pub data_url: String,
    /// Detached signature endpoint.
    pub signature_url: String,
    /// Minimum time between network checks.
    pub update_interval: Duration,
    /// Age after which the cached payload is unusable.
    pub max_age: Duration,
}

impl DatasetSource {
    /// Source with default refresh cadence.
    pub fn new(name: &str, data_url: &str, signature_url: &str) -> Self {
        Self {
            name: name.into(),
            data_url: data_url.into(),
            signature_url: signature_url.into(),
            update_interval: Duration::from_secs(60 * 60), // 1 hour
            max_age: Duration::from_secs(72 * 60 * 60),    // 72 hours
        }
    }
}

/// Configuration for the health certificate verifier.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Issuer trust list (standard certificates).
    pub trust_list: DatasetSource,
    /// National trust list (exemption certificates).
    pub national_trust_list: DatasetSource,
    /// Business rules.
    pub business_rules: DatasetSource,
    /// Value sets.
    pub value_sets: DatasetSource,
    /// Pinned key for dataset signatures: DER certificate, DER SPKI or SEC1 point.
    pub trust_anchor: Vec<u8>,
    /// Sent as `X-Token` when set.
    pub api_token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Directory for the encrypted dataset cache; memory only when unset.
    pub cache_dir: Option<PathBuf>,
    /// Secret the per-dataset storage keys are derived from.
    pub storage_secret: Vec<u8>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        let base = "https://dgc-trust.example.org";
        Self {
            trust_list: DatasetSource::new(
                "trust-list",
                &format!("{base}/trustlist"),
                &format!("{base}/trustlistsig"),
            ),
            national_trust_list: DatasetSource::new(
                "national-trust-list",
                &format!("{base}/trustlist-at"),
                &format!("{base}/trustlistsig-at"),
            ),
            business_rules: DatasetSource::new(
                "business-rules",
                &format!("{base}/rules"),
                &format!("{base}/rulessig"),
            ),
            value_sets: DatasetSource::new(
                "value-sets",
                &format!("{base}/valuesets"),
                &format!("{base}/valuesetssig"),
            ),
            trust_anchor: Vec::new(),
            api_token: None,
            timeout: Duration::from_secs(30),
            cache_dir: None,
            storage_secret: b"hcert-verify-default-storage".to_vec(),
        }
    }
}

impl VerifyConfig {
    /// All dataset sources in refresh priority order.
    pub fn sources(&self) -> [&DatasetSource; 4] {
        [
            &self.trust_list,
            &self.national_trust_list,
            &self.business_rules,
            &self.value_sets,
        ]
    }

    /// Check the configuration and parse the trust anchor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the anchor is missing or unparsable, a
    /// dataset's `max_age` is shorter than its `update_interval`, or two
    /// datasets share a name.
    pub fn validate(&self) -> Result<VerificationKey, VerifyError> {
        if self.trust_anchor.is_empty() {
            return Err(VerifyError::ConfigError {
                message: "trust anchor is not configured".into(),
            });
        }
        let anchor =
            VerificationKey::parse(&self.trust_anchor).map_err(|e| VerifyError::ConfigError {
                message: format!("trust anchor: {e}"),
            })?;

        let sources = self.sources();
        for (i, source) in sources.iter().enumerate() {
            if source.max_age < source.update_interval {
                return Err(VerifyError::ConfigError {
                    message: format!("{}: max_age is shorter than update_interval", source.name),
                });
            }
            if sources[..i].iter().any(|other| other.name == source.name) {
                return Err(VerifyError::ConfigError {
                    message: format!("duplicate dataset name {}", source.name),
                });
            }
        }

        Ok(anchor)
    }
}
