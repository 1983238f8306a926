//! End-to-end certificate verification through the engine.

use hcert_verify_core::{CertificateClaims, CertificateScheme, VerifyError};

use crate::common::*;

const VACCINATION: u64 = 2;
const TEST: u64 = 1;

#[tokio::test]
async fn hc1_roundtrip_is_valid_with_equal_claims() {
    let publisher = Publisher::new();
    let signer = dsc(&[VACCINATION], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    assert!(engine.update_all(false).await.error.is_none());

    let verdict = engine.verify(&issue("HC1:", &signer, vaccination_claims()));

    assert!(verdict.is_valid, "{:?}", verdict.error);
    assert!(verdict.error.is_none());
    assert_eq!(
        verdict.claims.unwrap(),
        CertificateClaims::from_value(vaccination_claims()).unwrap()
    );
    let meta = verdict.meta.unwrap();
    assert_eq!(meta.key_id, signer.key_id);
    assert_eq!(meta.issuer.as_deref(), Some("AT"));
    assert_eq!(meta.expires_at, at(NOW + 30 * 86_400));
}

#[tokio::test]
async fn certificate_outliving_its_key_is_expired() {
    let publisher = Publisher::new();
    // Key ends 2023-12-01, certificate runs to mid-December.
    let signer = dsc(&[], (2023, 12, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let verdict = engine.verify(&issue("HC1:", &signer, vaccination_claims()));

    assert_eq!(verdict.error, Some(VerifyError::CertificateExpired));
    assert!(verdict.meta.is_some());
    assert!(verdict.claims.is_some());
}

#[tokio::test]
async fn key_without_matching_usage_is_unsuitable() {
    let publisher = Publisher::new();
    let signer = dsc(&[TEST], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let verdict = engine.verify(&issue("HC1:", &signer, vaccination_claims()));
    assert_eq!(
        verdict.error,
        Some(VerifyError::UnsuitableKeyType {
            certificate_type: "Vaccination".into()
        })
    );

    let mut claims = vaccination_claims();
    claims.as_object_mut().unwrap().remove("v");
    claims["t"] = test_record();
    assert!(engine.verify(&issue("HC1:", &signer, claims)).is_valid);
}

#[tokio::test]
async fn unknown_key_is_not_in_trust_list() {
    let publisher = Publisher::new();
    let listed = dsc(&[], (2030, 1, 1));
    let unlisted = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&listed], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let verdict = engine.verify(&issue("HC1:", &unlisted, vaccination_claims()));
    assert!(matches!(verdict.error, Some(VerifyError::KeyNotInTrustList { .. })));
    assert!(verdict.claims.is_some());
}

#[tokio::test]
async fn key_id_collision_with_foreign_key_fails_signature() {
    let publisher = Publisher::new();
    let listed = dsc(&[], (2030, 1, 1));
    let forger = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&listed], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let code = encode_certificate(
        "HC1:",
        &forger.signer,
        &listed.key_id,
        NOW - 60,
        NOW + 86_400,
        vaccination_claims(),
    );
    let verdict = engine.verify(&code);
    assert!(matches!(verdict.error, Some(VerifyError::SignatureInvalid { .. })));
}

#[tokio::test]
async fn stale_trust_list_is_data_expired() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;
    let code = issue("HC1:", &signer, vaccination_claims());
    assert!(engine.verify(&code).is_valid);

    publisher.clock.advance(chrono::Duration::hours(72));
    let verdict = engine.verify(&code);
    assert!(matches!(verdict.error, Some(VerifyError::DataExpired { .. })));
}

#[tokio::test]
async fn verification_never_touches_the_network() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let before = publisher.served.request_count();
    engine.verify(&issue("HC1:", &signer, vaccination_claims()));
    engine.verify("XX1:6BFOXN*TS0BI$ZD4N9:9S6RCVN5+O30K3/XIV0W23NTDEXWK G2EP4J0B3KL6QM5/OVGA/MAT%ZSAPU*7LEDDP5-ZAW7O*U6O16UGLR1");
    assert_eq!(publisher.served.request_count(), before);
}

#[tokio::test]
async fn foreign_prefix_fails_before_decoding() {
    let publisher = Publisher::new();
    let engine = publisher.memory_engine();

    let verdict = engine.verify("XX1:not even base45 ~~~");
    assert_eq!(verdict.error, Some(VerifyError::InvalidSchemePrefix));
    assert!(verdict.meta.is_none());
    assert!(!verdict.is_valid);

    // Prefix match is case-sensitive.
    assert_eq!(
        engine.verify("hc1:6BF").error,
        Some(VerifyError::InvalidSchemePrefix)
    );
}

#[tokio::test]
async fn vaccination_plus_test_records_fail_claims() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let mut claims = vaccination_claims();
    claims["t"] = test_record();
    let verdict = engine.verify(&issue("HC1:", &signer, claims));

    assert!(matches!(
        verdict.error,
        Some(VerifyError::ClaimsDeserializationFailed { .. })
    ));
    assert!(verdict.claims.is_none());
    assert!(verdict.meta.is_none());
}

#[tokio::test]
async fn exemption_uses_national_trust_list() {
    let publisher = Publisher::new();
    let standard = dsc(&[], (2030, 1, 1));
    let national = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&standard], &[&national], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let exemption = issue("AT1:", &national, exemption_claims());
    assert!(engine.verify_exemption(&exemption).is_valid);
    assert_eq!(
        engine.verify(&exemption).error,
        Some(VerifyError::InvalidSchemePrefix)
    );

    let signed_by_standard = issue("AT1:", &standard, exemption_claims());
    assert!(matches!(
        engine.verify_exemption(&signed_by_standard).error,
        Some(VerifyError::KeyNotInTrustList { .. })
    ));

    let exemption_under_hc1 = issue("HC1:", &national, exemption_claims());
    assert!(matches!(
        engine.verify(&exemption_under_hc1).error,
        Some(VerifyError::ClaimsDeserializationFailed { .. })
    ));
}

#[tokio::test]
async fn decode_only_reads_either_prefix() {
    let publisher = Publisher::new();
    let engine = publisher.memory_engine();
    let signer = dsc(&[], (2030, 1, 1));

    let decoded = engine.decode(&issue("AT1:", &signer, exemption_claims())).unwrap();
    assert_eq!(decoded.scheme, CertificateScheme::Exemption);

    let decoded = engine.decode(&issue("HC1:", &signer, vaccination_claims())).unwrap();
    assert_eq!(decoded.scheme, CertificateScheme::Standard);
    assert_eq!(decoded.meta.key_id, signer.key_id);

    assert!(matches!(
        engine.decode("HC1:%%%%"),
        Err(VerifyError::Base45DecodingFailed { .. })
    ));
}

#[tokio::test]
async fn expired_certificate_with_valid_key() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let code = encode_certificate(
        "HC1:",
        &signer.signer,
        &signer.key_id,
        NOW - 10 * 86_400,
        NOW - 86_400,
        vaccination_claims(),
    );
    assert_eq!(engine.verify(&code).error, Some(VerifyError::CertificateExpired));
}
