//! Health certificate body.
//!
//! A certificate holds a person, a date of birth, and exactly one non-empty
//! record set. The record set is an enum, so a certificate carrying two
//! kinds of records cannot be represented: such input fails to deserialize.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VerifyError;

/// Kind of health certificate, derived from its record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateType {
    /// Vaccination records (`v`).
    Vaccination,
    /// Test records (`t`).
    Test,
    /// Recovery records (`r`).
    Recovery,
    /// Vaccination exemption records (`ve`).
    Exemption,
}

impl CertificateType {
    /// Name used by business rules and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vaccination => "Vaccination",
            Self::Test => "Test",
            Self::Recovery => "Recovery",
            Self::Exemption => "Exemption",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holder name, in plain and ICAO-transliterated forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    /// Family name.
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Transliterated family name.
    #[serde(rename = "fnt", default, skip_serializing_if = "Option::is_none")]
    pub family_name_transliterated: Option<String>,
    /// Given name.
    #[serde(rename = "gn", default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Transliterated given name.
    #[serde(rename = "gnt", default, skip_serializing_if = "Option::is_none")]
    pub given_name_transliterated: Option<String>,
}

/// One vaccination event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationEntry {
    /// Targeted disease.
    #[serde(rename = "tg")]
    pub target: String,
    /// Vaccine or prophylaxis.
    #[serde(rename = "vp")]
    pub vaccine: String,
    /// Medicinal product.
    #[serde(rename = "mp")]
    pub product: String,
    /// Marketing authorisation holder.
    #[serde(rename = "ma")]
    pub manufacturer: String,
    /// Dose number.
    #[serde(rename = "dn")]
    pub dose_number: u32,
    /// Total series of doses.
    #[serde(rename = "sd")]
    pub total_doses: u32,
    /// Date of vaccination.
    #[serde(rename = "dt")]
    pub date: String,
    /// Country of vaccination.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub issuer: String,
    /// Unique certificate identifier.
    #[serde(rename = "ci")]
    pub certificate_id: String,
}

/// One test event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEntry {
    /// Targeted disease.
    #[serde(rename = "tg")]
    pub target: String,
    /// Type of test.
    #[serde(rename = "tt")]
    pub test_type: String,
    /// Test name (NAAT).
    #[serde(rename = "nm", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Test device identifier (RAT).
    #[serde(rename = "ma", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Sample collection time.
    #[serde(rename = "sc")]
    pub sample_collected: String,
    /// Test result.
    #[serde(rename = "tr")]
    pub result: String,
    /// Testing centre.
    #[serde(rename = "tc", default, skip_serializing_if = "Option::is_none")]
    pub centre: Option<String>,
    /// Country of test.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub issuer: String,
    /// Unique certificate identifier.
    #[serde(rename = "ci")]
    pub certificate_id: String,
}

/// One recovery statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryEntry {
    /// Targeted disease.
    #[serde(rename = "tg")]
    pub target: String,
    /// Date of first positive result.
    #[serde(rename = "fr")]
    pub first_positive: String,
    /// Country of test.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub issuer: String,
    /// Valid from.
    #[serde(rename = "df")]
    pub valid_from: String,
    /// Valid until.
    #[serde(rename = "du")]
    pub valid_until: String,
    /// Unique certificate identifier.
    #[serde(rename = "ci")]
    pub certificate_id: String,
}

/// One vaccination exemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptionEntry {
    /// Targeted disease.
    #[serde(rename = "tg")]
    pub target: String,
    /// Country of issuance.
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate issuer.
    #[serde(rename = "is")]
    pub issuer: String,
    /// Valid until.
    #[serde(rename = "du")]
    pub valid_until: String,
    /// Unique certificate identifier.
    #[serde(rename = "ci")]
    pub certificate_id: String,
}

/// The single record set of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateRecords {
    /// Vaccination records.
    Vaccination(Vec<VaccinationEntry>),
    /// Test records.
    Test(Vec<TestEntry>),
    /// Recovery records.
    Recovery(Vec<RecoveryEntry>),
    /// Exemption records.
    Exemption(Vec<ExemptionEntry>),
}

/// Decoded certificate body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClaims", into = "RawClaims")]
pub struct CertificateClaims {
    /// Schema version.
    pub version: String,
    /// Holder name.
    pub name: PersonName,
    /// Date of birth as written on the certificate.
    pub date_of_birth: String,
    /// The record set.
    pub records: CertificateRecords,
}

impl CertificateClaims {
    /// Type derived from the record set.
    #[must_use]
    pub fn certificate_type(&self) -> CertificateType {
        match self.records {
            CertificateRecords::Vaccination(_) => CertificateType::Vaccination,
            CertificateRecords::Test(_) => CertificateType::Test,
            CertificateRecords::Recovery(_) => CertificateType::Recovery,
            CertificateRecords::Exemption(_) => CertificateType::Exemption,
        }
    }

    /// Decode from the JSON form of the `-260/1` claim.
    ///
    /// # Errors
    ///
    /// Returns `ClaimsDeserializationFailed` on schema violations, including
    /// zero or several populated record sets.
    pub fn from_value(value: Value) -> Result<Self, VerifyError> {
        serde_json::from_value(value).map_err(|e| VerifyError::claims(e.to_string()))
    }

    /// Canonical JSON form, as handed to the rule engine.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Wire mirror with every record set optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawClaims {
    ver: String,
    nam: PersonName,
    dob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<Vec<VaccinationEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<Vec<TestEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r: Option<Vec<RecoveryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ve: Option<Vec<ExemptionEntry>>,
}

impl TryFrom<RawClaims> for CertificateClaims {
    type Error = String;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let populated = |len: Option<usize>| len.is_some_and(|n| n > 0);
        let mut sets = Vec::with_capacity(1);
        if populated(raw.v.as_ref().map(Vec::len)) {
            sets.push(CertificateType::Vaccination);
        }
        if populated(raw.t.as_ref().map(Vec::len)) {
            sets.push(CertificateType::Test);
        }
        if populated(raw.r.as_ref().map(Vec::len)) {
            sets.push(CertificateType::Recovery);
        }
        if populated(raw.ve.as_ref().map(Vec::len)) {
            sets.push(CertificateType::Exemption);
        }

        let records = match sets.as_slice() {
            [CertificateType::Vaccination] => {
                CertificateRecords::Vaccination(raw.v.unwrap_or_default())
            },
            [CertificateType::Test] => CertificateRecords::Test(raw.t.unwrap_or_default()),
            [CertificateType::Recovery] => CertificateRecords::Recovery(raw.r.unwrap_or_default()),
            [CertificateType::Exemption] => {
                CertificateRecords::Exemption(raw.ve.unwrap_or_default())
            },
            [] => return Err("certificate carries no records".to_string()),
            many => {
                return Err(format!(
                    "certificate carries {} record sets, expected exactly one",
                    many.len()
                ))
            },
        };

        Ok(Self {
            version: raw.ver,
            name: raw.nam,
            date_of_birth: raw.dob,
            records,
        })
    }
}

impl From<CertificateClaims> for RawClaims {
    fn from(claims: CertificateClaims) -> Self {
        let mut raw = Self {
            ver: claims.version,
            nam: claims.name,
            dob: claims.date_of_birth,
            v: None,
            t: None,
            r: None,
            ve: None,
        };
        match claims.records {
            CertificateRecords::Vaccination(v) => raw.v = Some(v),
            CertificateRecords::Test(t) => raw.t = Some(t),
            CertificateRecords::Recovery(r) => raw.r = Some(r),
            CertificateRecords::Exemption(ve) => raw.ve = Some(ve),
        }
        raw
    }
}
