//! Signed dataset cache.
//!
//! A dataset is a payload published next to a detached signature. The
//! signature is a COSE_Sign1 over CWT claims whose subject is the SHA-256 of
//! the payload, signed by the pinned trust anchor. Refreshing fetches the
//! signature first and downloads the payload only when the asserted hash
//! differs from the cached one.
//!
//! ```text
//! refresh_if_needed(force)
//!   ├─ fresh and non-empty ─────────────────────► (false, None)
//!   ├─ fetch signature ─► verify anchor ─► check nbf/exp ─► subject hash
//!   ├─ hash == cached ─► last_update = now ─────► (false, None)
//!   └─ fetch payload ─► hash check ─► decode ─► index ─► commit ─► (true, None)
//! ```
//!
//! Failures leave the cached payload and state untouched. Each dataset has a
//! single writer: refreshing takes `&mut self`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hcert_crypto::{constant_time_eq, VerificationKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::cbor::cbor_to_json;
use crate::clock::{from_unix, Clock};
use crate::config::DatasetSource;
use crate::cose::CoseSign1;
use crate::cwt::CwtClaims;
use crate::error::VerifyError;
use crate::https::DatasetTransport;
use crate::storage::SealedStore;

/// Payload-specific behavior plugged into [`SignedDataset`].
pub trait DatasetCodec: Send + Sync {
    /// Decoded payload. `Default` is the empty sentinel.
    type Payload: Default + Send + Sync;
    /// Typed view derived from the payload after every replacement.
    type Index: Default + Send + Sync;

    /// Decode downloaded bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Payload, VerifyError>;

    /// Derive the typed view. Entries that fail to decode are skipped.
    fn index(&self, payload: &Self::Payload) -> Self::Index;

    /// Whether the payload holds no entries.
    fn is_empty(&self, payload: &Self::Payload) -> bool;
}

/// Decode a CBOR dataset payload of the form `{field: [entry, ...]}`.
///
/// Entries are returned as JSON so each can be decoded on its own and a
/// malformed one skipped without failing the batch.
pub fn decode_entry_list(bytes: &[u8], field: &str) -> Result<Vec<Value>, VerifyError> {
    let value = cbor_to_json(bytes).map_err(VerifyError::decoding)?;
    match value.get(field) {
        Some(Value::Array(entries)) => Ok(entries.clone()),
        Some(_) => Err(VerifyError::decoding(format!("{field:?} is not an array"))),
        None => Err(VerifyError::decoding(format!("missing {field:?} entry list"))),
    }
}

/// Persisted freshness record of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetState {
    /// Hash asserted by the last signature the payload was committed under.
    pub content_hash: Option<Vec<u8>>,
    /// When the payload was last confirmed current.
    pub last_update: Option<DateTime<Utc>>,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// A new payload was committed.
    pub changed: bool,
    /// Why the refresh failed, if it did.
    pub error: Option<VerifyError>,
}

impl RefreshOutcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn failed(error: VerifyError) -> Self {
        Self {
            changed: false,
            error: Some(error),
        }
    }
}

/// Collaborators shared by every dataset of an engine.
#[derive(Clone)]
pub struct DatasetContext {
    /// Key that signs dataset signatures.
    pub anchor: VerificationKey,
    /// Network transport.
    pub transport: Arc<dyn DatasetTransport>,
    /// Real-time clock used for freshness and signature validity.
    pub clock: Arc<dyn Clock>,
}

/// A trust-anchored, cached copy of one published dataset.
pub struct SignedDataset<C: DatasetCodec> {
    source: DatasetSource,
    codec: C,
    context: DatasetContext,
    store: SealedStore,
    payload: C::Payload,
    index: C::Index,
    state: DatasetState,
}

impl<C: DatasetCodec> SignedDataset<C> {
    /// Create a dataset, restoring any persisted payload.
    ///
    /// Persisted data that fails to unseal or decode is discarded with a
    /// warning and the dataset starts empty.
    pub fn new(source: DatasetSource, codec: C, context: DatasetContext, store: SealedStore) -> Self {
        let mut dataset = Self {
            source,
            codec,
            context,
            store,
            payload: C::Payload::default(),
            index: C::Index::default(),
            state: DatasetState::default(),
        };
        dataset.restore();
        dataset
    }

    fn state_name(&self) -> String {
        format!("{}.state", self.source.name)
    }

    fn restore(&mut self) {
        let name = self.source.name.clone();

        let state = match self.store.load(&self.state_name()) {
            Ok(Some(bytes)) => match serde_json::from_slice::<DatasetState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(dataset = %name, "Dataset: unreadable state, starting empty: {}", e);
                    self.discard_persisted();
                    return;
                },
            },
            Ok(None) => {
                debug!(dataset = %name, "Dataset: no persisted state");
                return;
            },
            Err(e) => {
                warn!(dataset = %name, "Dataset: failed to load state, starting empty: {}", e);
                return;
            },
        };

        let payload = match self.store.load(&name) {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(dataset = %name, "Dataset: persisted payload undecodable: {}", e);
                    self.discard_persisted();
                    return;
                },
            },
            Ok(None) => {
                warn!(dataset = %name, "Dataset: state without payload, starting empty");
                return;
            },
            Err(e) => {
                warn!(dataset = %name, "Dataset: failed to load payload: {}", e);
                self.discard_persisted();
                return;
            },
        };

        self.index = self.codec.index(&payload);
        self.payload = payload;
        self.state = state;
        info!(
            dataset = %name,
            last_update = ?self.state.last_update,
            "Dataset: restored from store"
        );
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Current freshness record.
    pub fn state(&self) -> &DatasetState {
        &self.state
    }

    /// Clock used for freshness.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.context.clock
    }

    /// Whether the cached payload holds no entries.
    pub fn is_empty(&self) -> bool {
        self.codec.is_empty(&self.payload)
    }

    /// Stale iff never updated or `now >= last_update + max_age`.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(self.context.clock.now())
    }

    fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_update {
            Some(last) => deadline(last, self.source.max_age).is_some_and(|end| now >= end),
            None => true,
        }
    }

    fn is_within_interval(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_update {
            Some(last) => deadline(last, self.source.update_interval).map_or(true, |end| now < end),
            None => false,
        }
    }

    /// The derived view, unless the dataset is stale.
    ///
    /// # Errors
    ///
    /// Returns `DataExpired` when stale.
    pub fn cached_view(&self) -> Result<&C::Index, VerifyError> {
        if self.is_stale() {
            return Err(VerifyError::DataExpired {
                dataset: self.source.name.clone(),
            });
        }
        Ok(&self.index)
    }

    /// Refresh, then return [`Self::cached_view`].
    ///
    /// A failed refresh is logged; the cached view is still served while it
    /// is fresh.
    pub async fn refreshed_view(&mut self, force: bool) -> Result<&C::Index, VerifyError> {
        let outcome = self.refresh_if_needed(force).await;
        if let Some(e) = &outcome.error {
            warn!(dataset = %self.source.name, "Dataset: refresh failed: {}", e);
        }
        self.cached_view()
    }

    /// Bring the dataset up to date with its publisher.
    #[instrument(skip(self), fields(dataset = %self.source.name))]
    pub async fn refresh_if_needed(&mut self, force: bool) -> RefreshOutcome {
        let now = self.context.clock.now();

        if !force && self.is_within_interval(now) && !self.is_empty() {
            debug!("Dataset: within update interval, skipping network");
            return RefreshOutcome::unchanged();
        }

        match self.refresh(now).await {
            Ok(changed) => RefreshOutcome {
                changed,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Dataset: refresh failed");
                RefreshOutcome::failed(e)
            },
        }
    }

    async fn refresh(&mut self, now: DateTime<Utc>) -> Result<bool, VerifyError> {
        let signature = self
            .context
            .transport
            .fetch(&self.source.signature_url)
            .await?;
        let asserted_hash = self.verify_signature(&signature, now)?;

        let unchanged = self
            .state
            .content_hash
            .as_deref()
            .is_some_and(|cached| constant_time_eq(cached, &asserted_hash));
        if unchanged {
            self.state.last_update = Some(now);
            self.persist_state();
            debug!("Dataset: signature confirms cached payload");
            return Ok(false);
        }

        let bytes = self.context.transport.fetch(&self.source.data_url).await?;
        let actual_hash = Sha256::digest(&bytes);
        if !constant_time_eq(&actual_hash, &asserted_hash) {
            return Err(VerifyError::signature_invalid(
                "payload hash does not match signed hash",
            ));
        }

        let payload = self.codec.decode(&bytes)?;
        let index = self.codec.index(&payload);

        self.payload = payload;
        self.index = index;
        self.state = DatasetState {
            content_hash: Some(asserted_hash),
            last_update: Some(now),
        };

        if let Err(e) = self.store.save(&self.source.name, &bytes) {
            warn!(error = %e, "Dataset: failed to persist payload");
        }
        self.persist_state();

        info!(
            len = bytes.len(),
            hash = %hex::encode(actual_hash),
            "Dataset: new payload committed"
        );
        Ok(true)
    }

    /// Verify a detached signature and return the content hash it asserts.
    fn verify_signature(&self, bytes: &[u8], now: DateTime<Utc>) -> Result<Vec<u8>, VerifyError> {
        let envelope =
            CoseSign1::parse(bytes).map_err(|e| VerifyError::decoding(format!("signature: {e}")))?;
        envelope.verify(&self.context.anchor)?;

        let claims = CwtClaims::parse(&envelope.payload)
            .map_err(|e| VerifyError::decoding(format!("signature claims: {e}")))?;

        if let Some(nbf) = claims.not_before {
            if now < from_unix(nbf) {
                return Err(VerifyError::NotYetValid);
            }
        }
        if let Some(exp) = claims.expires_at {
            if now > from_unix(exp) {
                return Err(VerifyError::Expired);
            }
        }

        claims
            .subject
            .ok_or_else(|| VerifyError::decoding("signature claims carry no subject hash"))
    }

    /// Drop persisted blobs that can never be restored, so the next start
    /// does not trip over them again.
    fn discard_persisted(&self) {
        for name in [self.source.name.clone(), self.state_name()] {
            if let Err(e) = self.store.delete(&name) {
                warn!(dataset = %self.source.name, error = %e, "Dataset: failed to discard {}", name);
            }
        }
    }

    fn persist_state(&self) {
        let persisted = serde_json::to_vec(&self.state)
            .map_err(|e| VerifyError::storage(e.to_string()))
            .and_then(|bytes| self.store.save(&self.state_name(), &bytes));
        if let Err(e) = persisted {
            warn!(dataset = %self.source.name, error = %e, "Dataset: failed to persist state");
        }
    }
}

/// `start + span`, or `None` when the sum is not representable.
fn deadline(start: DateTime<Utc>, span: std::time::Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| start.checked_add_signed(span))
}
