//! COSE_Sign1 envelopes.
//!
//! ```text
//! [61(] [18(] [ protected: bstr .cbor header_map,
//!               unprotected: header_map,
//!               payload: bstr,
//!               signature: bstr ] [)] [)]
//! ```
//!
//! Only the two header parameters the pipeline needs are read: `alg` (1)
//! and `kid` (4). `kid` is taken from the protected bucket when present
//! there, otherwise from the unprotected bucket. Detached payloads are not
//! supported.

use hcert_crypto::{CoseAlgorithm, CryptoError, EnvelopeSigner, VerificationKey};
use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::error::VerifyError;

/// CBOR tag for COSE_Sign1.
pub const COSE_SIGN1_TAG: u64 = 18;
/// CBOR tag for CWT.
pub const CWT_TAG: u64 = 61;

const HEADER_ALG: i64 = 1;
const HEADER_KID: i64 = 4;
const SIG_STRUCTURE_CONTEXT: &str = "Signature1";

/// A parsed COSE_Sign1 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseSign1 {
    /// Raw protected header bytes (signed over verbatim).
    pub protected: Vec<u8>,
    /// `alg` header value.
    pub algorithm: Option<i64>,
    /// `kid` header value.
    pub key_id: Option<Vec<u8>>,
    /// Embedded payload.
    pub payload: Vec<u8>,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

#[derive(Default)]
struct Headers {
    algorithm: Option<i64>,
    key_id: Option<Vec<u8>>,
}

impl CoseSign1 {
    /// Parse a tagged or untagged COSE_Sign1.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeDeserializationFailed` for any structural problem.
    pub fn parse(input: &[u8]) -> Result<Self, VerifyError> {
        Self::parse_inner(input).map_err(VerifyError::envelope)
    }

    fn parse_inner(input: &[u8]) -> Result<Self, String> {
        if input.is_empty() {
            return Err("empty input".to_string());
        }

        let mut dec = Decoder::new(input);

        while matches!(dec.datatype().map_err(|e| e.to_string())?, Type::Tag) {
            let tag = dec.tag().map_err(|e| e.to_string())?;
            if tag != Tag::new(COSE_SIGN1_TAG) && tag != Tag::new(CWT_TAG) {
                return Err(format!("unexpected CBOR tag {tag:?}"));
            }
        }

        let len = dec
            .array()
            .map_err(|e| format!("top-level item is not an array: {e}"))?
            .ok_or_else(|| "indefinite-length arrays are not supported".to_string())?;
        if len != 4 {
            return Err(format!("array length was {len}, expected 4"));
        }

        let protected = dec
            .bytes()
            .map_err(|e| format!("failed to read protected headers: {e}"))?
            .to_vec();
        let protected_headers = if protected.is_empty() {
            Headers::default()
        } else {
            let mut inner = Decoder::new(&protected);
            let headers = decode_headers(&mut inner)?;
            if inner.position() != protected.len() {
                return Err("trailing bytes after protected headers".to_string());
            }
            headers
        };

        let unprotected_headers = decode_headers(&mut dec)?;

        let payload = match dec.datatype().map_err(|e| e.to_string())? {
            Type::Bytes => dec.bytes().map_err(|e| e.to_string())?.to_vec(),
            Type::Null => return Err("detached payloads are not supported".to_string()),
            other => return Err(format!("payload has type {other:?}")),
        };

        let signature = dec
            .bytes()
            .map_err(|e| format!("failed to read signature: {e}"))?
            .to_vec();

        if dec.position() != input.len() {
            return Err("trailing bytes after COSE_Sign1".to_string());
        }

        Ok(Self {
            protected,
            algorithm: protected_headers.algorithm.or(unprotected_headers.algorithm),
            key_id: protected_headers.key_id.or(unprotected_headers.key_id),
            payload,
            signature,
        })
    }

    /// Build and sign an envelope with `alg` and `kid` in the protected bucket.
    ///
    /// # Errors
    ///
    /// Returns the signer's error if signing fails.
    pub fn sign<S: EnvelopeSigner + ?Sized>(
        signer: &S,
        key_id: &[u8],
        payload: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        let algorithm = signer.algorithm().cose_value();

        let mut enc = Encoder::new(Vec::new());
        let _ = enc
            .map(2)
            .and_then(|e| e.i64(HEADER_ALG))
            .and_then(|e| e.i64(algorithm))
            .and_then(|e| e.i64(HEADER_KID))
            .and_then(|e| e.bytes(key_id));
        let protected = enc.into_writer();

        let mut message = Self {
            protected,
            algorithm: Some(algorithm),
            key_id: Some(key_id.to_vec()),
            payload,
            signature: Vec::new(),
        };
        message.signature = signer.sign(&message.sig_structure())?;
        Ok(message)
    }

    /// `Sig_structure` bytes: `["Signature1", protected, h'', payload]`.
    #[must_use]
    pub fn sig_structure(&self) -> Vec<u8> {
        let mut enc = Encoder::new(Vec::with_capacity(
            32 + self.protected.len() + self.payload.len(),
        ));
        let _ = enc
            .array(4)
            .and_then(|e| e.str(SIG_STRUCTURE_CONTEXT))
            .and_then(|e| e.bytes(&self.protected))
            .and_then(|e| e.bytes(&[]))
            .and_then(|e| e.bytes(&self.payload));
        enc.into_writer()
    }

    /// Encode as a tagged COSE_Sign1 with an empty unprotected bucket.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new(Vec::new());
        let _ = enc
            .tag(Tag::new(COSE_SIGN1_TAG))
            .and_then(|e| e.array(4))
            .and_then(|e| e.bytes(&self.protected))
            .and_then(|e| e.map(0))
            .and_then(|e| e.bytes(&self.payload))
            .and_then(|e| e.bytes(&self.signature));
        enc.into_writer()
    }

    /// Verify the envelope signature under `key`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` when `alg` is missing or unsupported, the
    /// key cannot be used with it, or the signature does not match.
    pub fn verify(&self, key: &VerificationKey) -> Result<(), VerifyError> {
        let alg = self
            .algorithm
            .ok_or_else(|| VerifyError::signature_invalid("missing alg header"))?;
        let algorithm = CoseAlgorithm::from_cose_value(alg)
            .map_err(|e| VerifyError::signature_invalid(e.to_string()))?;

        key.verify(algorithm, &self.sig_structure(), &self.signature)
            .map_err(|e| match e {
                CryptoError::VerificationFailed => {
                    VerifyError::signature_invalid("signature does not match key")
                },
                other => VerifyError::signature_invalid(other.to_string()),
            })
    }
}

fn decode_headers(dec: &mut Decoder<'_>) -> Result<Headers, String> {
    let len = dec
        .map()
        .map_err(|e| format!("header bucket is not a map: {e}"))?
        .ok_or_else(|| "indefinite-length maps are not supported".to_string())?;

    let mut headers = Headers::default();
    for _ in 0..len {
        let label = match dec.datatype().map_err(|e| e.to_string())? {
            Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16 | Type::I32
            | Type::I64 => Some(dec.i64().map_err(|e| e.to_string())?),
            _ => {
                dec.skip().map_err(|e| e.to_string())?;
                None
            },
        };

        match label {
            Some(HEADER_ALG) => {
                headers.algorithm = Some(
                    dec.i64()
                        .map_err(|e| format!("alg is not an integer: {e}"))?,
                );
            },
            Some(HEADER_KID) => {
                headers.key_id = Some(
                    dec.bytes()
                        .map_err(|e| format!("kid is not a byte string: {e}"))?
                        .to_vec(),
                );
            },
            _ => dec.skip().map_err(|e| e.to_string())?,
        }
    }
    Ok(headers)
}
