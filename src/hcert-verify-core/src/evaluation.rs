//! Business rule evaluation.
//!
//! The expression language itself lives behind [`RuleEngine`]; this module
//! selects the rules that apply, builds the engine's context document and
//! derives a "valid until" date from metadata rules.
//!
//! ```text
//! rules (cached) ─► country + region ─► RuleEngine::validate ─► results
//!                                                   │ all passed
//!                                                   ▼
//!                          "<region>-MD" rules ─► first non-null date
//! ```

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::hcert::CertificateType;
use crate::rules::{BusinessRule, BusinessRuleService, RuleSet};
use crate::value_sets::{ValueSetIndex, ValueSetService};
use crate::verifier::DecodedCertificate;

/// Suffix of the synthetic region holding metadata rules.
pub const METADATA_REGION_SUFFIX: &str = "-MD";

/// Result of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleOutcome {
    /// The rule evaluated to `true`.
    Passed,
    /// The rule evaluated to `false`.
    Failed,
    /// The rule could not be evaluated.
    Open,
}

/// Outcome of one rule, or a synthetic outcome with no identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleResult {
    /// Rule identifier; `None` for synthetic results.
    pub identifier: Option<String>,
    /// Outcome.
    pub outcome: RuleOutcome,
    /// Why the rule is open.
    pub error: Option<String>,
}

impl RuleResult {
    fn synthetic(outcome: RuleOutcome) -> Self {
        Self {
            identifier: None,
            outcome,
            error: None,
        }
    }
}

/// Which rules apply to the certificate at hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFilter {
    /// Instant rules are evaluated at.
    pub validation_clock: DateTime<Utc>,
    /// Type of the certificate.
    pub certificate_type: CertificateType,
}

impl RuleFilter {
    /// Rule certificate type and validity window both match.
    pub fn admits(&self, rule: &BusinessRule) -> bool {
        rule.certificate_type.applies_to(self.certificate_type)
            && rule.is_valid_at(self.validation_clock)
    }
}

/// Business rule expression engine.
pub trait RuleEngine: Send + Sync {
    /// Evaluate one expression against `data`.
    fn evaluate(&self, logic: &Value, data: &Value) -> Result<Value, VerifyError>;

    /// Evaluate every rule `filter` admits, in order.
    fn validate(&self, rules: &[&BusinessRule], filter: &RuleFilter, data: &Value) -> Vec<RuleResult> {
        rules
            .iter()
            .filter(|rule| filter.admits(rule))
            .map(|rule| {
                let (outcome, error) = match self.evaluate(&rule.logic, data) {
                    Ok(Value::Bool(true)) => (RuleOutcome::Passed, None),
                    Ok(Value::Bool(false)) => (RuleOutcome::Failed, None),
                    Ok(other) => (RuleOutcome::Open, Some(format!("non-boolean result {other}"))),
                    Err(e) => (RuleOutcome::Open, Some(e.to_string())),
                };
                RuleResult {
                    identifier: Some(rule.identifier.clone()),
                    outcome,
                    error,
                }
            })
            .collect()
    }
}

/// What to evaluate and for which jurisdiction.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    /// The decoded certificate.
    pub certificate: &'a DecodedCertificate,
    /// Instant the rules are evaluated at; may differ from real time.
    pub validation_clock: DateTime<Utc>,
    /// Country whose rules apply.
    pub country_code: &'a str,
    /// Region within the country.
    pub region: Option<&'a str>,
}

/// Per-rule results plus the derived validity end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEvaluation {
    /// Results in rule order.
    pub results: Vec<RuleResult>,
    /// End of validity derived from metadata rules.
    pub valid_until: Option<DateTime<Utc>>,
}

impl RuleEvaluation {
    /// Whether every result passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.outcome == RuleOutcome::Passed)
    }
}

/// Runs cached rules through a [`RuleEngine`].
pub struct RuleOrchestrator<'e> {
    engine: &'e dyn RuleEngine,
}

impl<'e> RuleOrchestrator<'e> {
    /// Orchestrator over `engine`.
    pub fn new(engine: &'e dyn RuleEngine) -> Self {
        Self { engine }
    }

    /// Evaluate against the cached datasets.
    ///
    /// A stale rule or value set dataset, or two empty ones, yields a
    /// single synthetic failure rather than an error.
    pub fn evaluate(
        &self,
        rules: &BusinessRuleService,
        value_sets: &ValueSetService,
        request: EvaluationRequest<'_>,
    ) -> RuleEvaluation {
        match (rules.cached_view(), value_sets.cached_view()) {
            (Ok(rule_set), Ok(sets)) => self.evaluate_with(rule_set, sets, request),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Rules: datasets unusable, failing evaluation");
                RuleEvaluation {
                    results: vec![RuleResult::synthetic(RuleOutcome::Failed)],
                    valid_until: None,
                }
            },
        }
    }

    /// Evaluate against already loaded datasets.
    pub fn evaluate_with(
        &self,
        rule_set: &RuleSet,
        value_sets: &ValueSetIndex,
        request: EvaluationRequest<'_>,
    ) -> RuleEvaluation {
        if rule_set.is_empty() && value_sets.is_empty() {
            warn!("Rules: no rules and no value sets, failing evaluation");
            return RuleEvaluation {
                results: vec![RuleResult::synthetic(RuleOutcome::Failed)],
                valid_until: None,
            };
        }

        let filter = RuleFilter {
            validation_clock: request.validation_clock,
            certificate_type: request.certificate.claims.certificate_type(),
        };
        let data = engine_input(value_sets, &request);

        let applicable: Vec<&BusinessRule> = rule_set
            .for_jurisdiction(request.country_code, request.region)
            .collect();
        let mut results = self.engine.validate(&applicable, &filter, &data);
        if results.is_empty() {
            results.push(RuleResult::synthetic(RuleOutcome::Passed));
        }

        let mut evaluation = RuleEvaluation {
            results,
            valid_until: None,
        };
        if evaluation.all_passed() {
            evaluation.valid_until = self.valid_until(rule_set, &filter, &data, &request);
        }

        info!(
            country = %request.country_code,
            region = ?request.region,
            results = evaluation.results.len(),
            passed = evaluation.all_passed(),
            "Rules: evaluated"
        );
        evaluation
    }

    /// First metadata rule yielding a date wins; failures move on.
    fn valid_until(
        &self,
        rule_set: &RuleSet,
        filter: &RuleFilter,
        data: &Value,
        request: &EvaluationRequest<'_>,
    ) -> Option<DateTime<Utc>> {
        let region = format!("{}{METADATA_REGION_SUFFIX}", request.region?);

        // Bound to a local so the iterator is dropped before `region`.
        #[allow(clippy::let_and_return)]
        let valid_until = rule_set
            .for_jurisdiction(request.country_code, Some(&region))
            .filter(|rule| filter.admits(rule))
            .find_map(|rule| match self.engine.evaluate(&rule.logic, data) {
                Ok(Value::String(text)) => parse_date(&text),
                Ok(_) => None,
                Err(e) => {
                    debug!(rule = %rule.identifier, error = %e, "Rules: metadata rule failed");
                    None
                },
            });
        valid_until
    }
}

/// `{"external": {...}, "payload": <certificate>}` as the engine expects.
fn engine_input(value_sets: &ValueSetIndex, request: &EvaluationRequest<'_>) -> Value {
    let meta = &request.certificate.meta;
    json!({
        "external": {
            "validationClock": rfc3339(request.validation_clock),
            "valueSets": value_sets.codes_by_id(),
            "countryCode": request.country_code,
            "exp": rfc3339(meta.expires_at),
            "iat": rfc3339(meta.issued_at),
            "issuerCountryCode": meta.issuer.as_deref().unwrap_or_default(),
        },
        "payload": request.certificate.claims.to_value(),
    })
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// RFC 3339 timestamp or plain `YYYY-MM-DD` date.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}
