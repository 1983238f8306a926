//! Verification engine.
//!
//! Owns the four signed datasets and the certificate verifier:
//! 1. `update_all` refreshes every dataset in priority order
//! 2. `verify` / `verify_exemption` check a certificate from cache only
//! 3. `evaluate_rules` runs the cached business rules
//!
//! Refreshing needs `&mut self`; verification and evaluation need `&self`,
//! so a caller sharing the engine decides how writers are serialized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{DatasetSource, VerifyConfig};
use crate::dataset::{DatasetCodec, DatasetContext, RefreshOutcome, SignedDataset};
use crate::error::VerifyError;
use crate::evaluation::{EvaluationRequest, RuleEngine, RuleEvaluation, RuleOrchestrator};
use crate::https::{DatasetTransport, HttpsClient};
use crate::rules::{BusinessRuleCodec, BusinessRuleService};
use crate::storage::{BlobStore, FileBlobStore, MemoryBlobStore, SealedStore};
use crate::trust_list::{TrustListCodec, TrustListService};
use crate::value_sets::{ValueSetCodec, ValueSetService};
use crate::verifier::{
    decode_any, CertificateScheme, CertificateVerifier, DecodedCertificate, ValidationVerdict,
};

/// Freshness summary of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetStatus {
    /// Dataset name.
    pub name: String,
    /// When the dataset was last confirmed current.
    pub last_update: Option<DateTime<Utc>>,
    /// Too old to use.
    pub stale: bool,
    /// Holds no entries.
    pub empty: bool,
}

impl DatasetStatus {
    fn of<C: DatasetCodec>(dataset: &SignedDataset<C>) -> Self {
        Self {
            name: dataset.name().to_string(),
            last_update: dataset.state().last_update,
            stale: dataset.is_stale(),
            empty: dataset.is_empty(),
        }
    }
}

/// The health certificate verification engine.
pub struct HcertEngine {
    trust_list: TrustListService,
    national_trust_list: TrustListService,
    business_rules: BusinessRuleService,
    value_sets: ValueSetService,
    verifier: CertificateVerifier,
}

impl HcertEngine {
    /// Create an engine from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(
        config: &VerifyConfig,
        transport: Arc<dyn DatasetTransport>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self, VerifyError> {
        let anchor = config.validate()?;
        let context = DatasetContext {
            anchor,
            transport,
            clock: clock.clone(),
        };

        let sealed = |source: &DatasetSource| {
            SealedStore::new(store.clone(), &config.storage_secret, &source.name)
        };

        let engine = Self {
            trust_list: SignedDataset::new(
                config.trust_list.clone(),
                TrustListCodec,
                context.clone(),
                sealed(&config.trust_list),
            ),
            national_trust_list: SignedDataset::new(
                config.national_trust_list.clone(),
                TrustListCodec,
                context.clone(),
                sealed(&config.national_trust_list),
            ),
            business_rules: SignedDataset::new(
                config.business_rules.clone(),
                BusinessRuleCodec,
                context.clone(),
                sealed(&config.business_rules),
            ),
            value_sets: SignedDataset::new(
                config.value_sets.clone(),
                ValueSetCodec,
                context,
                sealed(&config.value_sets),
            ),
            verifier: CertificateVerifier::new(clock),
        };

        info!(
            cache_dir = ?config.cache_dir,
            "HcertEngine: initialized"
        );
        Ok(engine)
    }

    /// Create an engine with the HTTPS transport, the system clock and a
    /// file store under `cache_dir` (memory when unset).
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: VerifyConfig) -> Result<Self, VerifyError> {
        let transport = Arc::new(HttpsClient::new(config.timeout, config.api_token.clone())?);
        let store: Arc<dyn BlobStore> = match &config.cache_dir {
            Some(dir) => Arc::new(FileBlobStore::new(dir.clone())),
            None => {
                warn!("HcertEngine: no cache directory, datasets will not survive restart");
                Arc::new(MemoryBlobStore::new())
            },
        };
        Self::new(&config, transport, Arc::new(SystemClock), store)
    }

    /// Refresh every dataset: trust list, national trust list, business
    /// rules, value sets. `changed` is true if any dataset changed; the
    /// error is the first one in that order.
    #[instrument(skip(self))]
    pub async fn update_all(&mut self, force: bool) -> RefreshOutcome {
        let outcomes = [
            self.trust_list.refresh_if_needed(force).await,
            self.national_trust_list.refresh_if_needed(force).await,
            self.business_rules.refresh_if_needed(force).await,
            self.value_sets.refresh_if_needed(force).await,
        ];

        let combined = outcomes
            .into_iter()
            .fold(RefreshOutcome::default(), |acc, outcome| RefreshOutcome {
                changed: acc.changed || outcome.changed,
                error: acc.error.or(outcome.error),
            });

        info!(
            changed = combined.changed,
            failed = combined.error.is_some(),
            "HcertEngine: update complete"
        );
        combined
    }

    /// Verify an `HC1:` certificate against the trust list.
    pub fn verify(&self, code: &str) -> ValidationVerdict {
        self.verifier
            .verify(code, CertificateScheme::Standard, &self.trust_list)
    }

    /// Verify an `AT1:` certificate against the national trust list.
    pub fn verify_exemption(&self, code: &str) -> ValidationVerdict {
        self.verifier
            .verify(code, CertificateScheme::Exemption, &self.national_trust_list)
    }

    /// Decode without verifying the signature.
    ///
    /// # Errors
    ///
    /// Returns the first structural failure.
    pub fn decode(&self, code: &str) -> Result<DecodedCertificate, VerifyError> {
        decode_any(code)
    }

    /// Evaluate the cached business rules for `request`.
    pub fn evaluate_rules(
        &self,
        engine: &dyn RuleEngine,
        request: EvaluationRequest<'_>,
    ) -> RuleEvaluation {
        RuleOrchestrator::new(engine).evaluate(&self.business_rules, &self.value_sets, request)
    }

    /// Freshness of every dataset, in refresh order.
    pub fn status(&self) -> Vec<DatasetStatus> {
        vec![
            DatasetStatus::of(&self.trust_list),
            DatasetStatus::of(&self.national_trust_list),
            DatasetStatus::of(&self.business_rules),
            DatasetStatus::of(&self.value_sets),
        ]
    }

    /// Standard trust list.
    pub fn trust_list(&self) -> &TrustListService {
        &self.trust_list
    }

    /// Trust list for exemption certificates.
    pub fn national_trust_list(&self) -> &TrustListService {
        &self.national_trust_list
    }

    /// Mutable standard trust list, for refreshing key lookups.
    pub fn trust_list_mut(&mut self) -> &mut TrustListService {
        &mut self.trust_list
    }

    /// Business rules.
    pub fn business_rules(&self) -> &BusinessRuleService {
        &self.business_rules
    }

    /// Value sets.
    pub fn value_sets(&self) -> &ValueSetService {
        &self.value_sets
    }
}
