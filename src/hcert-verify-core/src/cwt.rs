//! CBOR Web Token claims carried as the COSE payload.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use serde_json::Value;

use crate::cbor::{decode_value, encode_value};

const CLAIM_ISS: i64 = 1;
const CLAIM_SUB: i64 = 2;
const CLAIM_EXP: i64 = 4;
const CLAIM_NBF: i64 = 5;
const CLAIM_IAT: i64 = 6;
const CLAIM_HCERT: i64 = -260;
const HCERT_V1: i64 = 1;

/// Timed claims plus the embedded health certificate, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CwtClaims {
    /// Issuer (country code for certificates).
    pub issuer: Option<String>,
    /// Subject. Dataset signatures put the content hash here; a text
    /// subject holding hex is decoded to bytes.
    pub subject: Option<Vec<u8>>,
    /// Expiry (Unix seconds).
    pub expires_at: Option<i64>,
    /// Not-before (Unix seconds).
    pub not_before: Option<i64>,
    /// Issued-at (Unix seconds).
    pub issued_at: Option<i64>,
    /// Health certificate body (`-260 / 1`) as JSON.
    pub hcert: Option<Value>,
}

impl CwtClaims {
    /// Parse a CWT claims map.
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        let mut dec = Decoder::new(payload);
        let len = dec
            .map()
            .map_err(|e| format!("claims are not a map: {e}"))?
            .ok_or_else(|| "indefinite-length maps are not supported".to_string())?;

        let mut claims = Self::default();
        for _ in 0..len {
            let Some(key) = read_int_key(&mut dec)? else {
                dec.skip().map_err(|e| e.to_string())?;
                continue;
            };

            match key {
                CLAIM_ISS => {
                    claims.issuer = Some(dec.str().map_err(|e| format!("iss: {e}"))?.to_string());
                },
                CLAIM_SUB => claims.subject = Some(read_subject(&mut dec)?),
                CLAIM_EXP => claims.expires_at = Some(read_time(&mut dec, "exp")?),
                CLAIM_NBF => claims.not_before = Some(read_time(&mut dec, "nbf")?),
                CLAIM_IAT => claims.issued_at = Some(read_time(&mut dec, "iat")?),
                CLAIM_HCERT => claims.hcert = read_hcert(&mut dec)?,
                _ => dec.skip().map_err(|e| e.to_string())?,
            }
        }

        if dec.position() != payload.len() {
            return Err("trailing bytes after claims".to_string());
        }
        Ok(claims)
    }

    /// Encode as a CWT claims map.
    #[must_use]
    pub fn to_cbor(&self) -> Vec<u8> {
        let count = [
            self.issuer.is_some(),
            self.subject.is_some(),
            self.expires_at.is_some(),
            self.not_before.is_some(),
            self.issued_at.is_some(),
            self.hcert.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let mut enc = Encoder::new(Vec::new());
        let _ = enc.map(count as u64);
        if let Some(iss) = &self.issuer {
            let _ = enc.i64(CLAIM_ISS).and_then(|e| e.str(iss));
        }
        if let Some(sub) = &self.subject {
            let _ = enc.i64(CLAIM_SUB).and_then(|e| e.bytes(sub));
        }
        for (label, value) in [
            (CLAIM_EXP, self.expires_at),
            (CLAIM_NBF, self.not_before),
            (CLAIM_IAT, self.issued_at),
        ] {
            if let Some(v) = value {
                let _ = enc.i64(label).and_then(|e| e.i64(v));
            }
        }
        if let Some(hcert) = &self.hcert {
            let _ = enc
                .i64(CLAIM_HCERT)
                .and_then(|e| e.map(1))
                .and_then(|e| e.i64(HCERT_V1));
            encode_value(&mut enc, hcert);
        }
        enc.into_writer()
    }
}

fn read_int_key(dec: &mut Decoder<'_>) -> Result<Option<i64>, String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16 | Type::I32
        | Type::I64 => Ok(Some(dec.i64().map_err(|e| e.to_string())?)),
        _ => {
            dec.skip().map_err(|e| e.to_string())?;
            Ok(None)
        },
    }
}

fn read_subject(dec: &mut Decoder<'_>) -> Result<Vec<u8>, String> {
    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Bytes => Ok(dec.bytes().map_err(|e| e.to_string())?.to_vec()),
        Type::String => {
            let text = dec.str().map_err(|e| e.to_string())?;
            Ok(hex::decode(text).unwrap_or_else(|_| text.as_bytes().to_vec()))
        },
        other => Err(format!("sub has type {other:?}")),
    }
}

fn read_time(dec: &mut Decoder<'_>, claim: &str) -> Result<i64, String> {
    match decode_value(dec, 0)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("{claim} is out of range")),
        other => Err(format!("{claim} is not numeric: {other}")),
    }
}

fn read_hcert(dec: &mut Decoder<'_>) -> Result<Option<Value>, String> {
    let len = dec
        .map()
        .map_err(|e| format!("hcert claim is not a map: {e}"))?
        .ok_or_else(|| "indefinite-length maps are not supported".to_string())?;

    let mut certificate = None;
    for _ in 0..len {
        match read_int_key(dec)? {
            Some(HCERT_V1) => certificate = Some(decode_value(dec, 0)?),
            _ => dec.skip().map_err(|e| e.to_string())?,
        }
    }
    Ok(certificate)
}
