use std::time::Duration as StdDuration;

use sesame_credentials::domain::repository::{OtpRepository, SessionRepository};
use sesame_credentials::domain::types::{NewSession, OtpPurpose};
use sesame_credentials::error::CredentialError;
use sesame_credentials::infra::ephemeral::{otp_data_key, session_key};
use sesame_credentials::infra::hybrid::{FallbackPolicy, HybridConfig};

use crate::helpers::{Harness, TEST_EMAIL, wrong_code};

const PURPOSE: OtpPurpose = OtpPurpose::EmailVerification;

fn new_session(token_hash: &str) -> NewSession {
    NewSession {
        account_id: "u1".to_owned(),
        token_hash: token_hash.to_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn should_use_cache_tier_when_healthy() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());

    repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();
    repo.create_session(&new_session("h1")).await.unwrap();

    assert!(h.kv.raw(&otp_data_key(TEST_EMAIL, PURPOSE)).is_some());
    assert!(h.kv.raw(&session_key("h1")).is_some());
    assert!(h.otp_docs.docs.lock().unwrap().is_empty());
    assert!(h.session_docs.docs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_fall_back_to_durable_tier_when_cache_is_down() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());
    h.kv.faults.set_down(true);

    let otp = repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();
    let validated = repo.validate_otp(TEST_EMAIL, PURPOSE, &otp.code).await.unwrap();
    assert_eq!(validated.id, otp.id);

    let session = repo.create_session(&new_session("h1")).await.unwrap();
    let fetched = repo.get_session_by_token("h1").await.unwrap().unwrap();
    assert_eq!(fetched.id, session.id);

    assert_eq!(h.otp_docs.docs.lock().unwrap().len(), 1);
    assert!(h.session_docs.get("h1").is_some());
}

#[tokio::test]
async fn should_not_repair_cache_after_fallback_read() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());

    h.kv.faults.set_down(true);
    repo.create_session(&new_session("h1")).await.unwrap();
    assert!(repo.get_session_by_token("h1").await.unwrap().is_some());
    h.kv.faults.set_down(false);

    assert!(h.kv.raw(&session_key("h1")).is_none());
    // A healthy cache answering "absent" is final.
    assert!(repo.get_session_by_token("h1").await.unwrap().is_none());
}

#[tokio::test]
async fn should_keep_cache_mismatch_final_by_default() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());
    let otp = repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();

    h.otp_docs.faults.set_down(true);
    let result = repo
        .validate_otp(TEST_EMAIL, PURPOSE, &wrong_code(&otp.code))
        .await;
    assert!(
        matches!(result, Err(CredentialError::Mismatch)),
        "expected Mismatch, got {result:?}"
    );
}

#[tokio::test]
async fn should_retry_domain_errors_on_durable_tier_with_any_error_policy() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig {
        fallback_policy: FallbackPolicy::AnyError,
        ..Default::default()
    });
    let otp = repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();

    let result = repo
        .validate_otp(TEST_EMAIL, PURPOSE, &wrong_code(&otp.code))
        .await;
    assert!(
        matches!(result, Err(CredentialError::NotFound)),
        "expected the durable tier's NotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_surface_durable_error_when_both_tiers_fail() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());
    h.kv.faults.set_down(true);
    h.session_docs.faults.set_down(true);

    let result = repo.create_session(&new_session("h1")).await;
    assert!(
        matches!(result, Err(CredentialError::BackendUnavailable(_))),
        "expected BackendUnavailable, got {result:?}"
    );
    assert!(result.unwrap_err().is_backend_failure());
}

#[tokio::test]
async fn should_use_durable_tier_only_when_cache_disabled() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig {
        use_cache_for_otp: false,
        use_cache_for_session: false,
        ..Default::default()
    });

    repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();
    repo.create_session(&new_session("h1")).await.unwrap();
    assert!(h.kv.raw(&otp_data_key(TEST_EMAIL, PURPOSE)).is_none());
    assert!(h.kv.raw(&session_key("h1")).is_none());
    assert_eq!(h.otp_docs.docs.lock().unwrap().len(), 1);

    // No fallback in the other direction.
    h.session_docs.faults.set_down(true);
    let result = repo.get_session_by_token("h1").await;
    assert!(
        matches!(result, Err(CredentialError::BackendUnavailable(_))),
        "expected BackendUnavailable, got {result:?}"
    );
}

#[tokio::test]
async fn should_route_each_class_independently() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig {
        use_cache_for_otp: false,
        ..Default::default()
    });

    repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();
    repo.create_session(&new_session("h1")).await.unwrap();

    assert_eq!(h.otp_docs.docs.lock().unwrap().len(), 1);
    assert!(h.kv.raw(&otp_data_key(TEST_EMAIL, PURPOSE)).is_none());
    assert!(h.kv.raw(&session_key("h1")).is_some());
    assert!(h.session_docs.docs.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn should_fall_back_when_cache_hangs() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig {
        operation_timeout: StdDuration::from_millis(50),
        ..Default::default()
    });
    h.kv.faults.set_hang(true);

    let otp = repo.create_otp(TEST_EMAIL, PURPOSE).await.unwrap();
    let stored = h.otp_docs.docs.lock().unwrap()[0].clone();
    assert_eq!(stored.id, otp.id);
}

#[tokio::test(start_paused = true)]
async fn should_time_out_when_both_tiers_hang() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig {
        operation_timeout: StdDuration::from_millis(50),
        ..Default::default()
    });
    h.kv.faults.set_hang(true);
    h.session_docs.faults.set_hang(true);

    let result = repo.get_session_by_token("h1").await;
    assert!(
        matches!(result, Err(CredentialError::Timeout)),
        "expected Timeout, got {result:?}"
    );
}

#[tokio::test]
async fn should_not_retry_reused_token_hash_on_durable_tier() {
    let h = Harness::new();
    let repo = h.hybrid(HybridConfig::default());
    repo.create_session(&new_session("h1")).await.unwrap();

    let result = repo.create_session(&new_session("h1")).await;
    assert!(
        matches!(result, Err(CredentialError::TokenAlreadyExists)),
        "expected TokenAlreadyExists, got {result:?}"
    );
    assert!(h.session_docs.docs.lock().unwrap().is_empty());
}
