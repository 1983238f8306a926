//! Dataset refresh behavior across the four engine datasets.

use std::sync::Arc;

use hcert_crypto::P256Signer;
use hcert_verify_core::{
    BlobStore, CertificateType, FileBlobStore, MemoryBlobStore, TrustSource, VerifyError,
};

use crate::common::*;

#[tokio::test]
async fn first_update_fetches_everything() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[&signer], &[]);
    let mut engine = publisher.memory_engine();

    let outcome = engine.update_all(false).await;
    assert!(outcome.changed);
    assert!(outcome.error.is_none());
    // Signature and payload for each of the four datasets.
    assert_eq!(publisher.served.request_count(), 8);

    let status = engine.status();
    let names: Vec<_> = status.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        ["trust-list", "national-trust-list", "business-rules", "value-sets"]
    );
    assert!(status.iter().all(|s| !s.stale));
    assert!(status.iter().all(|s| s.last_update == Some(at(NOW))));
}

#[tokio::test]
async fn second_update_within_interval_is_free() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    let rules = [rule("GR-AT-0001", "AT", "", "General", serde_json::json!(true))];
    publisher.publish_all(&[&signer], &[&signer], &rules);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    let before = publisher.served.request_count();
    publisher.clock.advance(chrono::Duration::minutes(59));
    let outcome = engine.update_all(false).await;

    assert!(!outcome.changed);
    assert!(outcome.error.is_none());
    assert_eq!(publisher.served.request_count(), before);
}

#[tokio::test]
async fn unchanged_signature_only_advances_last_update() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    let rules = [rule("GR-AT-0001", "AT", "", "General", serde_json::json!(true))];
    publisher.publish_all(&[&signer], &[&signer], &rules);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    publisher.clock.advance(chrono::Duration::hours(2));
    let before = publisher.served.request_count();
    let outcome = engine.update_all(false).await;

    assert!(!outcome.changed);
    assert!(outcome.error.is_none());
    // Signatures only.
    assert_eq!(publisher.served.request_count(), before + 4);
    assert!(engine
        .status()
        .iter()
        .all(|s| s.last_update == Some(at(NOW + 7200))));
}

#[tokio::test]
async fn republished_dataset_reports_change() {
    let publisher = Publisher::new();
    let first = dsc(&[], (2030, 1, 1));
    let second = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&first], &[&first], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    publisher.publish(&publisher.config.trust_list, trust_list_body(&[&first, &second]));
    let outcome = engine.update_all(true).await;

    assert!(outcome.changed);
    assert!(engine
        .trust_list()
        .resolve_key(&second.key_id, CertificateType::Test, None)
        .is_ok());
}

#[tokio::test]
async fn first_error_in_priority_order_wins() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[&signer], &[]);
    publisher.served.remove(&publisher.config.business_rules.signature_url);
    publisher.served.remove(&publisher.config.national_trust_list.signature_url);
    let mut engine = publisher.memory_engine();

    let outcome = engine.update_all(false).await;

    assert!(outcome.changed, "trust list and value sets still committed");
    match outcome.error {
        Some(VerifyError::ServiceError { message }) => {
            assert!(message.contains(&publisher.config.national_trust_list.signature_url));
        },
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn dataset_signed_by_other_key_is_rejected() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_signed_by(
        &P256Signer::random(),
        &publisher.config.trust_list,
        trust_list_body(&[&signer]),
    );
    let mut engine = publisher.memory_engine();

    let outcome = engine.update_all(false).await;
    assert!(matches!(outcome.error, Some(VerifyError::SignatureInvalid { .. })));

    let status = &engine.status()[0];
    assert!(status.stale);
    assert!(status.empty);
    assert!(matches!(
        engine.trust_list().resolve_key(&signer.key_id, CertificateType::Test, None),
        Err(VerifyError::DataExpired { .. })
    ));
}

#[tokio::test]
async fn restart_restores_from_memory_store() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[&signer], &[]);
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    publisher.engine(store.clone()).update_all(false).await;

    publisher.served.clear();
    let engine = publisher.engine(store);
    assert!(engine.status().iter().all(|s| !s.stale));
    assert!(engine.verify(&issue("HC1:", &signer, vaccination_claims())).is_valid);
}

#[tokio::test]
async fn restart_restores_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[&signer], &[]);

    let store = || -> Arc<dyn BlobStore> { Arc::new(FileBlobStore::new(dir.path())) };
    publisher.engine(store()).update_all(false).await;
    assert!(dir.path().join("trust-list").exists());
    assert!(dir.path().join("trust-list.state").exists());

    publisher.served.clear();
    let mut engine = publisher.engine(store());
    assert!(engine.verify(&issue("HC1:", &signer, vaccination_claims())).is_valid);

    // Within the interval a restored, non-empty dataset is not refetched.
    let outcome = engine.update_all(false).await;
    assert!(!outcome.changed);
    assert_eq!(engine.status()[0].last_update, Some(at(NOW)));
}

#[tokio::test]
async fn different_storage_secret_starts_cold() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[&signer], &[]);
    let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    publisher.engine(store.clone()).update_all(false).await;

    let mut config = publisher.config.clone();
    config.storage_secret = b"another secret".to_vec();
    let engine = hcert_verify_core::HcertEngine::new(
        &config,
        publisher.served.clone(),
        publisher.clock.clone(),
        store,
    )
    .unwrap();

    assert!(engine.status().iter().all(|s| s.stale && s.empty));
}

#[tokio::test]
async fn refreshing_lookup_fetches_when_due() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();

    assert!(matches!(
        engine.trust_list().resolve_key(&signer.key_id, CertificateType::Vaccination, None),
        Err(VerifyError::DataExpired { .. })
    ));
    let key = engine
        .trust_list_mut()
        .resolve_key_refreshed(&signer.key_id, CertificateType::Vaccination, None)
        .await;
    assert!(key.is_ok());
    assert_eq!(publisher.served.request_count(), 2);
}

#[tokio::test]
async fn refreshing_lookup_past_interval_refreshes_once() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    publisher.clock.advance(chrono::Duration::hours(2));
    let before = publisher.served.request_count();
    let trust_list = engine.trust_list_mut();
    assert!(trust_list
        .resolve_key_refreshed(&signer.key_id, CertificateType::Recovery, None)
        .await
        .is_ok());
    // Signature only: the payload hash is unchanged.
    assert_eq!(publisher.served.request_count(), before + 1);
    assert_eq!(trust_list.state().last_update, Some(at(NOW + 7200)));

    assert!(trust_list
        .resolve_key_refreshed(&signer.key_id, CertificateType::Recovery, None)
        .await
        .is_ok());
    assert_eq!(publisher.served.request_count(), before + 1);
}

#[tokio::test]
async fn refreshing_lookup_serves_fresh_cache_when_refresh_fails() {
    let publisher = Publisher::new();
    let signer = dsc(&[], (2030, 1, 1));
    publisher.publish_all(&[&signer], &[], &[]);
    let mut engine = publisher.memory_engine();
    engine.update_all(false).await;

    publisher.clock.advance(chrono::Duration::hours(2));
    publisher.served.clear();
    let key = engine
        .trust_list_mut()
        .resolve_key_refreshed(&signer.key_id, CertificateType::Test, None)
        .await;
    assert!(key.is_ok());
    assert_eq!(engine.status()[0].last_update, Some(at(NOW)));

    publisher.clock.advance(chrono::Duration::hours(70));
    assert!(matches!(
        engine
            .trust_list_mut()
            .resolve_key_refreshed(&signer.key_id, CertificateType::Test, None)
            .await,
        Err(VerifyError::DataExpired { .. })
    ));
}
