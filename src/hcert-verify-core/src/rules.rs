//! Business rules dataset.
//!
//! Rules are published as `{"r": [{"i": id, "r": "<rule JSON>"}, ...]}`;
//! each rule body is a CertLogic document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dataset::{decode_entry_list, DatasetCodec, SignedDataset};
use crate::error::VerifyError;
use crate::hcert::CertificateType;

/// Certificate types a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCertificateType {
    /// Every certificate type.
    General,
    /// Vaccination certificates.
    Vaccination,
    /// Test certificates.
    Test,
    /// Recovery certificates.
    Recovery,
    /// Exemption certificates.
    Exemption,
}

impl RuleCertificateType {
    /// Whether a rule of this type applies to `certificate_type`.
    pub fn applies_to(self, certificate_type: CertificateType) -> bool {
        match self {
            Self::General => true,
            Self::Vaccination => certificate_type == CertificateType::Vaccination,
            Self::Test => certificate_type == CertificateType::Test,
            Self::Recovery => certificate_type == CertificateType::Recovery,
            Self::Exemption => certificate_type == CertificateType::Exemption,
        }
    }
}

/// One jurisdiction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BusinessRule {
    /// Unique rule identifier, e.g. `GR-AT-0001`.
    pub identifier: String,
    /// `Acceptance` or `Invalidation`.
    #[serde(rename = "Type")]
    pub rule_type: String,
    /// Country the rule belongs to.
    pub country: String,
    /// Region within the country; an empty string means none.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub region: Option<String>,
    /// Rule version.
    pub version: String,
    /// Certificate schema version the rule targets.
    pub schema_version: String,
    /// Expression engine, `CERTLOGIC`.
    pub engine: String,
    /// Expression engine version.
    pub engine_version: String,
    /// Certificate types the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localized descriptions.
    #[serde(default)]
    pub description: Vec<RuleDescription>,
    /// Start of the rule's validity.
    pub valid_from: DateTime<Utc>,
    /// End of the rule's validity.
    pub valid_to: DateTime<Utc>,
    /// Certificate fields the rule reads.
    #[serde(default)]
    pub affected_fields: Vec<String>,
    /// Expression handed to the rule engine.
    pub logic: Value,
}

impl BusinessRule {
    /// Whether the rule is in force at `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_to
    }

    /// Whether the rule belongs to `country` and exactly `region`.
    pub fn matches_jurisdiction(&self, country: &str, region: Option<&str>) -> bool {
        self.country == country && self.region.as_deref() == region
    }
}

/// Rule description in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescription {
    /// Language code.
    pub lang: String,
    /// Description text.
    pub desc: String,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let region = Option::<String>::deserialize(deserializer)?;
    Ok(region.filter(|r| !r.is_empty()))
}

/// Parsed rules in publication order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<BusinessRule>,
}

impl RuleSet {
    /// Wrap already parsed rules.
    pub fn new(rules: Vec<BusinessRule>) -> Self {
        Self { rules }
    }

    /// All rules.
    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// Whether no rule parsed.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules for exactly `country` and `region`, in order.
    pub fn for_jurisdiction<'a>(
        &'a self,
        country: &'a str,
        region: Option<&'a str>,
    ) -> impl Iterator<Item = &'a BusinessRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.matches_jurisdiction(country, region))
    }
}

#[derive(Debug, Deserialize)]
struct WireRule {
    i: String,
    r: String,
}

/// Decodes the business rules dataset.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusinessRuleCodec;

fn parse_rule(value: &Value) -> Result<BusinessRule, String> {
    let wire = WireRule::deserialize(value).map_err(|e| e.to_string())?;
    serde_json::from_str(&wire.r).map_err(|e| format!("{}: {e}", wire.i))
}

impl DatasetCodec for BusinessRuleCodec {
    type Payload = Vec<Value>;
    type Index = RuleSet;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Value>, VerifyError> {
        decode_entry_list(bytes, "r")
    }

    fn index(&self, payload: &Vec<Value>) -> RuleSet {
        let rules: Vec<BusinessRule> = payload
            .iter()
            .filter_map(|value| {
                parse_rule(value)
                    .map_err(|e| warn!("Business rules: skipping malformed rule: {}", e))
                    .ok()
            })
            .collect();
        debug!(rules = rules.len(), total = payload.len(), "Business rules: indexed");
        RuleSet::new(rules)
    }

    fn is_empty(&self, payload: &Vec<Value>) -> bool {
        payload.is_empty()
    }
}

/// Fetched, signed business rules.
pub type BusinessRuleService = SignedDataset<BusinessRuleCodec>;
