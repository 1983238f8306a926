//! # hcert-verify-core
//!
//! Verification of `HC1:` / `AT1:` health certificates against signed,
//! cached trust lists, and evaluation of jurisdiction business rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       HcertEngine                            │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ HttpsClient  │  │ SealedStore  │  │    Clock     │       │
//! │  │ (X-Token)    │  │ (XChaCha20)  │  │              │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐       │
//! │  │        SignedDataset<C> (anchor-verified)         │       │
//! │  │  trust list · national trust list · rules · sets  │       │
//! │  └──────────────────────────────────────────────────┘       │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐       │
//! │  │             CertificateVerifier                   │       │
//! │  │  prefix · base45 · zlib · COSE · CWT · key · exp  │       │
//! │  └──────────────────────────────────────────────────┘       │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐       │
//! │  │             RuleOrchestrator                      │       │
//! │  │    (country/region filter, metadata rules)       │       │
//! │  └──────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Properties
//!
//! - **Pinned anchor**: datasets are accepted only under the configured key
//! - **Hash-bound payloads**: a payload must match the hash its signature asserts
//! - **Staleness is an error**: expired datasets are never consulted
//! - **No network on verify**: single certificates are checked from cache

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use
#![allow(clippy::ptr_arg)] // DatasetCodec payloads are Vec<Value>

pub mod cbor;
pub mod clock;
pub mod codec;
pub mod config;
pub mod cose;
pub mod cwt;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod hcert;
pub mod https;
pub mod rules;
pub mod storage;
pub mod trust_list;
pub mod value_sets;
pub mod verifier;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{DatasetSource, VerifyConfig};
pub use cose::CoseSign1;
pub use cwt::CwtClaims;
pub use dataset::{DatasetCodec, DatasetContext, DatasetState, RefreshOutcome, SignedDataset};
pub use engine::{DatasetStatus, HcertEngine};
pub use error::VerifyError;
pub use evaluation::{
    EvaluationRequest, RuleEngine, RuleEvaluation, RuleFilter, RuleOrchestrator, RuleOutcome,
    RuleResult,
};
pub use hcert::{CertificateClaims, CertificateRecords, CertificateType, PersonName};
pub use https::{DatasetTransport, HttpsClient};
pub use rules::{BusinessRule, BusinessRuleService, RuleSet};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore, SealedStore};
pub use trust_list::{
    CertificateWindow, StaticTrustSource, TrustEntry, TrustList, TrustListService, TrustSource,
};
pub use value_sets::{ValueSet, ValueSetIndex, ValueSetService};
pub use verifier::{
    decode_any, decode_certificate, CertificateMeta, CertificateScheme, CertificateVerifier,
    DecodedCertificate, ValidationVerdict,
};
