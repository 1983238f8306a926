//! Shared fixtures: an in-memory publisher, signing certificates and
//! certificate encoding.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hcert_crypto::{EnvelopeSigner, P256Signer};
use hcert_verify_core::cbor::json_to_cbor;
use hcert_verify_core::codec::{base45_encode, zlib_compress};
use hcert_verify_core::{
    BlobStore, Clock, CoseSign1, CwtClaims, DatasetSource, DatasetTransport, FixedClock, HcertEngine,
    MemoryBlobStore, RuleEngine, VerifyConfig, VerifyError,
};
use rcgen::{CertificateParams, ExtendedKeyUsagePurpose, KeyPair};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// 2023-11-14T22:13:20Z
pub const NOW: i64 = 1_700_000_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
pub struct Served {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl Served {
    pub fn put(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn clear(&self) {
        self.bodies.lock().unwrap().clear();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl DatasetTransport for Served {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, VerifyError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| VerifyError::service(format!("HTTP 404 from {url}")))
    }
}

/// Document signing certificate and its key.
pub struct Dsc {
    pub signer: P256Signer,
    pub der: Vec<u8>,
    pub key_id: Vec<u8>,
}

/// Signing certificate valid 2021-06-01 .. `not_after`, with the given
/// usage OIDs (last arc of `1.3.6.1.4.1.1847.2021.1.x`).
pub fn dsc(usages: &[u64], not_after: (i32, u8, u8)) -> Dsc {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["dsc.hcert.test".to_string()]).unwrap();
    params.not_before = rcgen::date_time_ymd(2021, 6, 1);
    params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
    params.extended_key_usages = usages
        .iter()
        .map(|arc| ExtendedKeyUsagePurpose::Other(vec![1, 3, 6, 1, 4, 1, 1847, 2021, 1, *arc]))
        .collect();
    let cert = params.self_signed(&key).unwrap();

    let der = cert.der().to_vec();
    Dsc {
        signer: P256Signer::from_pkcs8_der(&key.serialize_der()).unwrap(),
        key_id: Sha256::digest(&der)[..8].to_vec(),
        der,
    }
}

pub fn trust_list_body(dscs: &[&Dsc]) -> Vec<u8> {
    let entries: Vec<Value> = dscs
        .iter()
        .map(|d| json!({"i": BASE64.encode(&d.key_id), "c": BASE64.encode(&d.der)}))
        .collect();
    json_to_cbor(&json!({ "c": entries }))
}

pub fn rule(id: &str, country: &str, region: &str, certificate_type: &str, logic: Value) -> Value {
    json!({
        "Identifier": id,
        "Type": "Acceptance",
        "Country": country,
        "Region": region,
        "Version": "1.0.0",
        "SchemaVersion": "1.3.0",
        "Engine": "CERTLOGIC",
        "EngineVersion": "0.7.5",
        "CertificateType": certificate_type,
        "Description": [{"lang": "en", "desc": id}],
        "ValidFrom": "2021-06-01T00:00:00Z",
        "ValidTo": "2030-06-01T00:00:00Z",
        "AffectedFields": [],
        "Logic": logic
    })
}

pub fn rules_body(rules: &[Value]) -> Vec<u8> {
    let entries: Vec<Value> = rules
        .iter()
        .map(|r| json!({"i": r["Identifier"], "r": r.to_string()}))
        .collect();
    json_to_cbor(&json!({ "r": entries }))
}

pub fn value_sets_body(sets: &[(&str, &[&str])]) -> Vec<u8> {
    let entries: Vec<Value> = sets
        .iter()
        .map(|(id, codes)| {
            let values: serde_json::Map<String, Value> = codes
                .iter()
                .map(|code| {
                    (
                        code.to_string(),
                        json!({"display": code, "lang": "en", "active": true, "version": "", "system": ""}),
                    )
                })
                .collect();
            let set = json!({"valueSetId": id, "valueSetDate": "2021-04-27", "valueSetValues": values});
            json!({"n": id, "v": set.to_string()})
        })
        .collect();
    json_to_cbor(&json!({ "v": entries }))
}

/// Publishes datasets signed by a trust anchor.
pub struct Publisher {
    pub anchor: P256Signer,
    pub served: Arc<Served>,
    pub clock: Arc<FixedClock>,
    pub config: VerifyConfig,
}

impl Publisher {
    pub fn new() -> Self {
        let anchor = P256Signer::random();
        let config = VerifyConfig {
            trust_anchor: anchor.public_key().unwrap(),
            ..VerifyConfig::default()
        };
        Self {
            anchor,
            served: Arc::new(Served::default()),
            clock: Arc::new(FixedClock::from_unix_secs(NOW)),
            config,
        }
    }

    /// Serve `body` and a detached signature over it.
    pub fn publish(&self, source: &DatasetSource, body: Vec<u8>) {
        self.publish_signed_by(&self.anchor, source, body);
    }

    pub fn publish_signed_by(&self, signer: &P256Signer, source: &DatasetSource, body: Vec<u8>) {
        let claims = CwtClaims {
            issuer: Some("publisher".into()),
            subject: Some(Sha256::digest(&body).to_vec()),
            issued_at: Some(self.clock.now().timestamp()),
            expires_at: Some(self.clock.now().timestamp() + 7 * 86_400),
            ..CwtClaims::default()
        };
        let signature = CoseSign1::sign(signer, b"anchor", claims.to_cbor()).unwrap();
        self.served.put(&source.signature_url, signature.encode());
        self.served.put(&source.data_url, body);
    }

    /// Trust list with `dscs`, national trust list with `national`, the
    /// given rules and one value set.
    pub fn publish_all(&self, dscs: &[&Dsc], national: &[&Dsc], rules: &[Value]) {
        self.publish(&self.config.trust_list, trust_list_body(dscs));
        self.publish(&self.config.national_trust_list, trust_list_body(national));
        self.publish(&self.config.business_rules, rules_body(rules));
        self.publish(
            &self.config.value_sets,
            value_sets_body(&[("vaccines-covid-19-names", &["EU/1/20/1528", "EU/1/20/1507"][..])]),
        );
    }

    pub fn engine(&self, store: Arc<dyn BlobStore>) -> HcertEngine {
        HcertEngine::new(&self.config, self.served.clone(), self.clock.clone(), store).unwrap()
    }

    pub fn memory_engine(&self) -> HcertEngine {
        self.engine(Arc::new(MemoryBlobStore::new()))
    }
}

pub fn vaccination_claims() -> Value {
    json!({
        "ver": "1.3.0",
        "nam": {"fn": "Musterfrau-Gößinger", "fnt": "MUSTERFRAU<GOESSINGER", "gn": "Gabriele", "gnt": "GABRIELE"},
        "dob": "1998-02-26",
        "v": [{
            "tg": "840539006", "vp": "1119349007", "mp": "EU/1/20/1528", "ma": "ORG-100030215",
            "dn": 2, "sd": 2, "dt": "2023-09-01", "co": "AT", "is": "Ministry of Health, Austria",
            "ci": "URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B"
        }]
    })
}

pub fn test_record() -> Value {
    json!([{
        "tg": "840539006", "tt": "LP6464-4", "nm": "Roche LightCycler qPCR",
        "sc": "2023-11-14T08:00:00Z", "tr": "260415000", "tc": "Testing center Vienna 1",
        "co": "AT", "is": "Ministry of Health, Austria", "ci": "URN:UVCI:01:AT:71EE2559DE38C6BF7304FB65A1A451EC#3"
    }])
}

pub fn exemption_claims() -> Value {
    json!({
        "ver": "1.3.0",
        "nam": {"fn": "Muster", "fnt": "MUSTER", "gn": "Max", "gnt": "MAX"},
        "dob": "1980-01-01",
        "ve": [{
            "tg": "840539006", "co": "AT", "is": "Ministry of Health, Austria",
            "du": "2024-06-30", "ci": "URN:UVCI:01:AT:EX1#Z"
        }]
    })
}

/// `prefix + base45(zlib(COSE_Sign1(CWT)))`.
pub fn encode_certificate(
    prefix: &str,
    signer: &P256Signer,
    key_id: &[u8],
    issued_at: i64,
    expires_at: i64,
    hcert: Value,
) -> String {
    let claims = CwtClaims {
        issuer: Some("AT".into()),
        issued_at: Some(issued_at),
        expires_at: Some(expires_at),
        hcert: Some(hcert),
        ..CwtClaims::default()
    };
    let envelope = CoseSign1::sign(signer, key_id, claims.to_cbor()).unwrap();
    let compressed = zlib_compress(&envelope.encode()).unwrap();
    format!("{prefix}{}", base45_encode(&compressed))
}

/// Certificate issued an hour ago, expiring in 30 days.
pub fn issue(prefix: &str, dsc: &Dsc, hcert: Value) -> String {
    encode_certificate(prefix, &dsc.signer, &dsc.key_id, NOW - 3600, NOW + 30 * 86_400, hcert)
}

/// A tiny CertLogic subset: `var`, `===`, `and`, `if`, `in` and literals.
pub struct MiniLogic;

impl RuleEngine for MiniLogic {
    fn evaluate(&self, logic: &Value, data: &Value) -> Result<Value, VerifyError> {
        eval(logic, data)
    }
}

fn eval(logic: &Value, data: &Value) -> Result<Value, VerifyError> {
    let Value::Object(expression) = logic else {
        return Ok(logic.clone());
    };
    let (op, args) = expression.iter().next().ok_or_else(|| unsupported("{}"))?;
    let args: Vec<Value> = match args {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };

    match op.as_str() {
        "var" => Ok(lookup(data, args.first().and_then(Value::as_str).unwrap_or(""))),
        "===" => Ok(Value::Bool(eval(&args[0], data)? == eval(&args[1], data)?)),
        "and" => {
            for arg in &args {
                let value = eval(arg, data)?;
                if value != Value::Bool(true) {
                    return Ok(value);
                }
            }
            Ok(Value::Bool(true))
        },
        "if" => {
            if eval(&args[0], data)? == Value::Bool(true) {
                eval(&args[1], data)
            } else {
                eval(&args[2], data)
            }
        },
        "in" => {
            let needle = eval(&args[0], data)?;
            let haystack = eval(&args[1], data)?;
            Ok(Value::Bool(
                haystack.as_array().is_some_and(|items| items.contains(&needle)),
            ))
        },
        other => Err(unsupported(other)),
    }
}

fn lookup(data: &Value, path: &str) -> Value {
    path.split('.')
        .try_fold(data, |value, segment| match value {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(fields) => fields.get(segment),
            _ => None,
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn unsupported(op: &str) -> VerifyError {
    VerifyError::RuleEvaluationFailed {
        reason: format!("unsupported operation {op}"),
    }
}
