//! CBOR to JSON bridge.
//!
//! Certificate bodies and dataset payloads are CBOR on the wire but are
//! handled as `serde_json::Value` everywhere else (the rule engine consumes
//! JSON). Byte strings become standard Base64 text; tags are dropped and
//! their content kept; indefinite-length items are rejected.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// Maximum nesting of arrays and maps.
pub const MAX_DEPTH: usize = 32;

/// Decode a complete CBOR item into JSON, rejecting trailing bytes.
pub fn cbor_to_json(bytes: &[u8]) -> Result<Value, String> {
    let mut dec = Decoder::new(bytes);
    let value = decode_value(&mut dec, 0)?;
    if dec.position() != bytes.len() {
        return Err("trailing bytes after CBOR item".to_string());
    }
    Ok(value)
}

/// Decode a complete CBOR item straight into a serde type.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    serde_json::from_value(cbor_to_json(bytes)?).map_err(|e| e.to_string())
}

/// Decode the next CBOR item from `dec`.
pub(crate) fn decode_value(dec: &mut Decoder<'_>, depth: usize) -> Result<Value, String> {
    if depth > MAX_DEPTH {
        return Err(format!("nesting deeper than {MAX_DEPTH}"));
    }

    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Bool => Ok(Value::Bool(dec.bool().map_err(|e| e.to_string())?)),
        Type::Null => {
            dec.null().map_err(|e| e.to_string())?;
            Ok(Value::Null)
        },
        Type::Undefined => {
            dec.undefined().map_err(|e| e.to_string())?;
            Ok(Value::Null)
        },
        Type::U64 => Ok(Value::from(dec.u64().map_err(|e| e.to_string())?)),
        Type::U8 | Type::U16 | Type::U32 | Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
            Ok(Value::from(dec.i64().map_err(|e| e.to_string())?))
        },
        Type::Int => {
            let int = dec.int().map_err(|e| e.to_string())?;
            i64::try_from(int)
                .map(Value::from)
                .map_err(|_| "integer out of range".to_string())
        },
        Type::F16 | Type::F32 | Type::F64 => {
            let f = dec.f64().map_err(|e| e.to_string())?;
            Ok(Number::from_f64(f).map_or(Value::Null, Value::Number))
        },
        Type::Bytes => {
            let b = dec.bytes().map_err(|e| e.to_string())?;
            Ok(Value::String(BASE64.encode(b)))
        },
        Type::String => Ok(Value::String(
            dec.str().map_err(|e| e.to_string())?.to_string(),
        )),
        Type::Tag => {
            dec.tag().map_err(|e| e.to_string())?;
            decode_value(dec, depth)
        },
        Type::Array => {
            let len = dec
                .array()
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "indefinite-length arrays are not supported".to_string())?;
            let mut out = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                out.push(decode_value(dec, depth + 1)?);
            }
            Ok(Value::Array(out))
        },
        Type::Map => {
            let len = dec
                .map()
                .map_err(|e| e.to_string())?
                .ok_or_else(|| "indefinite-length maps are not supported".to_string())?;
            let mut out = Map::new();
            for _ in 0..len {
                let key = match decode_value(dec, depth + 1)? {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    other => return Err(format!("unsupported map key: {other}")),
                };
                let value = decode_value(dec, depth + 1)?;
                out.insert(key, value);
            }
            Ok(Value::Object(out))
        },
        other => Err(format!("unsupported CBOR type: {other:?}")),
    }
}

/// Encode JSON as CBOR.
///
/// Object keys become text keys; numbers keep their integer or float form.
pub fn json_to_cbor(value: &Value) -> Vec<u8> {
    let mut enc = Encoder::new(Vec::new());
    encode_value(&mut enc, value);
    enc.into_writer()
}

/// Encode one JSON value.
pub(crate) fn encode_value(enc: &mut Encoder<Vec<u8>>, value: &Value) {
    // Writes into a Vec are infallible.
    match value {
        Value::Null => {
            let _ = enc.null();
        },
        Value::Bool(b) => {
            let _ = enc.bool(*b);
        },
        Value::Number(n) => {
            let _ = if let Some(i) = n.as_i64() {
                enc.i64(i)
            } else if let Some(u) = n.as_u64() {
                enc.u64(u)
            } else {
                enc.f64(n.as_f64().unwrap_or_default())
            };
        },
        Value::String(s) => {
            let _ = enc.str(s);
        },
        Value::Array(items) => {
            let _ = enc.array(items.len() as u64);
            for item in items {
                encode_value(enc, item);
            }
        },
        Value::Object(map) => {
            let _ = enc.map(map.len() as u64);
            for (k, v) in map {
                let _ = enc.str(k);
                encode_value(enc, v);
            }
        },
    }
}
