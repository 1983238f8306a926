//! Property-based tests for the decoding stages.
//!
//! Untrusted certificate text must never panic the pipeline, and any
//! change to a signed payload must be caught.

use hcert_crypto::P256Signer;
use hcert_verify_core::cbor::cbor_to_json;
use hcert_verify_core::codec::{base45_decode, base45_encode};
use hcert_verify_core::{decode_certificate, CertificateScheme, CoseSign1};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    /// Base45 encoding round-trips any byte string.
    #[test]
    fn base45_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let encoded = base45_encode(&data);
        prop_assert_eq!(base45_decode(&encoded).unwrap(), data);
    }

    /// Base45 output stays inside the QR alphanumeric alphabet.
    #[test]
    fn base45_alphabet(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let encoded = base45_encode(&data);
        prop_assert!(encoded
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase() || " $%*+-./:".contains(c)));
    }

    #[test]
    fn base45_decode_never_panics(text in "\\PC{0,200}") {
        let _ = base45_decode(&text);
    }

    /// Arbitrary text after the prefix is rejected, never a panic.
    #[test]
    fn decode_never_panics(body in "[0-9A-Z $%*+./:-]{0,300}") {
        let _ = decode_certificate(&format!("HC1:{body}"), CertificateScheme::Standard);
    }

    #[test]
    fn cose_parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = CoseSign1::parse(&bytes);
    }

    #[test]
    fn cbor_to_json_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = cbor_to_json(&bytes);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 16,
        max_shrink_iters: 50,
        ..ProptestConfig::default()
    })]

    /// Flipping any payload bit breaks the signature.
    #[test]
    fn tampered_payload_fails_verification(
        payload in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let signer = P256Signer::random();
        let key = signer.verification_key();
        let mut envelope = CoseSign1::sign(&signer, b"kid", payload).unwrap();
        prop_assert!(envelope.verify(&key).is_ok());

        let at = index.index(envelope.payload.len());
        envelope.payload[at] ^= 1 << bit;
        prop_assert!(envelope.verify(&key).is_err());
    }

    /// The encoded envelope parses back to the same message.
    #[test]
    fn signed_envelope_reparses(payload in prop::collection::vec(any::<u8>(), 0..256)) {
        let signer = P256Signer::random();
        let envelope = CoseSign1::sign(&signer, b"kid", payload).unwrap();
        let parsed = CoseSign1::parse(&envelope.encode()).unwrap();
        prop_assert!(parsed.verify(&signer.verification_key()).is_ok());
        prop_assert_eq!(parsed, envelope);
    }
}
