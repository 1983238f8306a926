//! Value sets dataset: coded-term dictionaries used as rule context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dataset::{decode_entry_list, DatasetCodec, SignedDataset};
use crate::error::VerifyError;

/// One coded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetEntry {
    /// Human-readable label.
    pub display: String,
    /// Language of `display`.
    pub lang: String,
    /// Whether the code may still be issued.
    pub active: bool,
    /// Code system version.
    pub version: String,
    /// Code system URI.
    pub system: String,
}

/// A named dictionary of codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet {
    /// Set identifier, e.g. `vaccines-covid-19-names`.
    #[serde(rename = "valueSetId")]
    pub id: String,
    /// Publication date.
    #[serde(rename = "valueSetDate")]
    pub date: String,
    /// Code → entry.
    #[serde(rename = "valueSetValues")]
    pub values: BTreeMap<String, ValueSetEntry>,
}

/// Parsed value sets by identifier.
#[derive(Debug, Clone, Default)]
pub struct ValueSetIndex {
    sets: BTreeMap<String, ValueSet>,
}

impl ValueSetIndex {
    /// Index `sets`; a later set with the same id replaces an earlier one.
    pub fn new(sets: impl IntoIterator<Item = ValueSet>) -> Self {
        Self {
            sets: sets.into_iter().map(|set| (set.id.clone(), set)).collect(),
        }
    }

    /// Look up a set.
    pub fn get(&self, id: &str) -> Option<&ValueSet> {
        self.sets.get(id)
    }

    /// Number of sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no set parsed.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Set id → list of codes, the shape the rule engine's `valueSets`
    /// context expects.
    pub fn codes_by_id(&self) -> BTreeMap<String, Vec<String>> {
        self.sets
            .iter()
            .map(|(id, set)| (id.clone(), set.values.keys().cloned().collect()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct WireValueSet {
    n: String,
    v: String,
}

/// Decodes the value sets dataset.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueSetCodec;

impl DatasetCodec for ValueSetCodec {
    type Payload = Vec<Value>;
    type Index = ValueSetIndex;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, VerifyError> {
        decode_entry_list(bytes, "v")
    }

    fn index(&self, payload: &Vec<Value>) -> ValueSetIndex {
        let sets = payload.iter().filter_map(|value| {
            let parsed = WireValueSet::deserialize(value)
                .map_err(|e| e.to_string())
                .and_then(|wire| {
                    serde_json::from_str::<ValueSet>(&wire.v).map_err(|e| format!("{}: {e}", wire.n))
                });
            match parsed {
                Ok(set) => Some(set),
                Err(e) => {
                    warn!("Value sets: skipping malformed set: {}", e);
                    None
                },
            }
        });
        let index = ValueSetIndex::new(sets);
        debug!(sets = index.len(), total = payload.len(), "Value sets: indexed");
        index
    }

    fn is_empty(&self, payload: &Vec<Value>) -> bool {
        payload.is_empty()
    }
}

/// Fetched, signed value sets.
pub type ValueSetService = SignedDataset<ValueSetCodec>;
