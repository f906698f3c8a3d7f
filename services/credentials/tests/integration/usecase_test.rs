use chrono::Duration;

use sesame_credentials::domain::repository::{OtpRepository, SessionRepository};
use sesame_credentials::domain::types::OtpPurpose;
use sesame_credentials::error::CredentialError;
use sesame_credentials::infra::hybrid::HybridConfig;
use sesame_credentials::token::hash_token;
use sesame_credentials::usecase::otp::{IssueOtpUseCase, VerifyOtpUseCase};
use sesame_credentials::usecase::session::{
    AuthenticateUseCase, ClientInfo, IssueSessionUseCase, RevokeSessionsUseCase,
    RotateSessionUseCase,
};

use crate::helpers::{Harness, TEST_EMAIL, wrong_code};

fn client() -> ClientInfo {
    ClientInfo {
        user_agent: Some("Mozilla/5.0".to_owned()),
        ip_address: Some("10.0.0.1".to_owned()),
    }
}

// ── OTP ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_issue_otp_under_normalized_email() {
    let h = Harness::new();
    let usecase = IssueOtpUseCase {
        otps: h.ephemeral_otps(),
    };

    let otp = usecase
        .execute("  A@X.com ", OtpPurpose::EmailVerification)
        .await
        .unwrap();
    assert_eq!(otp.email, TEST_EMAIL);

    let stored = h
        .ephemeral_otps()
        .get_otp(TEST_EMAIL, OtpPurpose::EmailVerification)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, otp.id);
}

#[tokio::test]
async fn should_reject_blank_email_on_issue() {
    let h = Harness::new();
    let usecase = IssueOtpUseCase {
        otps: h.durable_otps(),
    };

    let result = usecase.execute("   ", OtpPurpose::PasswordReset).await;
    assert!(
        matches!(result, Err(CredentialError::ValidationFailed(_))),
        "expected ValidationFailed, got {result:?}"
    );
    assert!(h.otp_docs.docs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_consume_otp_on_successful_verify() {
    let h = Harness::new();
    let issue = IssueOtpUseCase {
        otps: h.hybrid(HybridConfig::default()),
    };
    let verify = VerifyOtpUseCase {
        otps: h.hybrid(HybridConfig::default()),
    };

    let otp = issue
        .execute(TEST_EMAIL, OtpPurpose::PasswordReset)
        .await
        .unwrap();
    let verified = verify
        .execute("A@x.com", OtpPurpose::PasswordReset, &format!(" {} ", otp.code))
        .await
        .unwrap();
    assert_eq!(verified.id, otp.id);

    let replay = verify
        .execute(TEST_EMAIL, OtpPurpose::PasswordReset, &otp.code)
        .await;
    assert!(
        matches!(replay, Err(CredentialError::NotFound)),
        "expected NotFound on replay, got {replay:?}"
    );
}

#[tokio::test]
async fn should_keep_otp_after_failed_verify() {
    let h = Harness::new();
    let issue = IssueOtpUseCase {
        otps: h.durable_otps(),
    };
    let verify = VerifyOtpUseCase {
        otps: h.durable_otps(),
    };

    let otp = issue
        .execute(TEST_EMAIL, OtpPurpose::EmailVerification)
        .await
        .unwrap();
    let result = verify
        .execute(TEST_EMAIL, OtpPurpose::EmailVerification, &wrong_code(&otp.code))
        .await;
    assert!(matches!(result, Err(CredentialError::Mismatch)));
    assert!(result.unwrap_err().is_auth_failure());

    verify
        .execute(TEST_EMAIL, OtpPurpose::EmailVerification, &otp.code)
        .await
        .unwrap();
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_issue_session_storing_only_token_hash() {
    let h = Harness::new();
    let usecase = IssueSessionUseCase {
        sessions: h.durable_sessions(),
        clock: h.clock(),
        ttl: None,
    };

    let issued = usecase.execute("u1", &client()).await.unwrap();
    assert_eq!(issued.session.token_hash, hash_token(&issued.token));
    assert_ne!(issued.session.token_hash, issued.token);
    assert_eq!(issued.session.ip_address.as_deref(), Some("10.0.0.1"));

    let stored = h.session_docs.get(&issued.session.token_hash).unwrap();
    assert_eq!(stored.id, issued.session.id);
    assert_eq!(stored.expires_at - stored.created_at, Duration::hours(24));
}

#[tokio::test]
async fn should_honor_custom_session_ttl() {
    let h = Harness::new();
    let usecase = IssueSessionUseCase {
        sessions: h.ephemeral_sessions(),
        clock: h.clock(),
        ttl: Some(Duration::minutes(30)),
    };

    let issued = usecase.execute("u1", &ClientInfo::default()).await.unwrap();
    assert_eq!(
        issued.session.expires_at - issued.session.created_at,
        Duration::minutes(30)
    );

    let authenticate = AuthenticateUseCase {
        sessions: h.ephemeral_sessions(),
    };
    h.clock.advance(Duration::minutes(30));
    let result = authenticate.execute(&issued.token).await;
    assert!(matches!(result, Err(CredentialError::NotFound)));
}

#[tokio::test]
async fn should_authenticate_live_token_and_record_use() {
    let h = Harness::new();
    let issue = IssueSessionUseCase {
        sessions: h.durable_sessions(),
        clock: h.clock(),
        ttl: None,
    };
    let authenticate = AuthenticateUseCase {
        sessions: h.durable_sessions(),
    };

    let issued = issue.execute("u1", &client()).await.unwrap();
    h.clock.advance(Duration::minutes(5));

    let session = authenticate.execute(&issued.token).await.unwrap();
    assert_eq!(session.account_id, "u1");
    let stored = h.session_docs.get(&issued.session.token_hash).unwrap();
    assert_eq!(stored.last_used_at, issued.session.created_at + Duration::minutes(5));

    let result = authenticate.execute("not-a-token").await;
    assert!(
        matches!(result, Err(CredentialError::NotFound)),
        "expected NotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_rotate_session_and_retire_old_token() {
    let h = Harness::new();
    let issue = IssueSessionUseCase {
        sessions: h.hybrid(HybridConfig::default()),
        clock: h.clock(),
        ttl: None,
    };
    let rotate = RotateSessionUseCase {
        sessions: h.hybrid(HybridConfig::default()),
        clock: h.clock(),
        ttl: None,
    };
    let authenticate = AuthenticateUseCase {
        sessions: h.hybrid(HybridConfig::default()),
    };

    let first = issue.execute("u1", &client()).await.unwrap();
    let second = rotate.execute(&first.token, &client()).await.unwrap();
    assert_ne!(first.token, second.token);
    assert_eq!(second.session.account_id, "u1");

    assert!(matches!(
        authenticate.execute(&first.token).await,
        Err(CredentialError::NotFound)
    ));
    assert_eq!(
        authenticate.execute(&second.token).await.unwrap().id,
        second.session.id
    );

    let replay = rotate.execute(&first.token, &client()).await;
    assert!(matches!(replay, Err(CredentialError::NotFound)));
    let live = h
        .ephemeral_sessions()
        .get_sessions_by_account_id("u1")
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn should_log_out_single_session() {
    let h = Harness::new();
    let issue = IssueSessionUseCase {
        sessions: h.ephemeral_sessions(),
        clock: h.clock(),
        ttl: None,
    };
    let revoke = RevokeSessionsUseCase {
        sessions: h.ephemeral_sessions(),
    };
    let authenticate = AuthenticateUseCase {
        sessions: h.ephemeral_sessions(),
    };

    let phone = issue.execute("u1", &client()).await.unwrap();
    let laptop = issue.execute("u1", &client()).await.unwrap();
    revoke.logout(&phone.token).await.unwrap();

    assert!(authenticate.execute(&phone.token).await.is_err());
    assert!(authenticate.execute(&laptop.token).await.is_ok());
    // Repeated logout is harmless.
    revoke.logout(&phone.token).await.unwrap();
}

#[tokio::test]
async fn should_log_out_everywhere() {
    let h = Harness::new();
    let issue = IssueSessionUseCase {
        sessions: h.durable_sessions(),
        clock: h.clock(),
        ttl: None,
    };
    let revoke = RevokeSessionsUseCase {
        sessions: h.durable_sessions(),
    };
    let authenticate = AuthenticateUseCase {
        sessions: h.durable_sessions(),
    };

    let a = issue.execute("u1", &client()).await.unwrap();
    let b = issue.execute("u1", &client()).await.unwrap();
    let other = issue.execute("u2", &client()).await.unwrap();

    assert_eq!(revoke.logout_everywhere("u1").await.unwrap(), 2);
    assert!(authenticate.execute(&a.token).await.is_err());
    assert!(authenticate.execute(&b.token).await.is_err());
    assert!(authenticate.execute(&other.token).await.is_ok());
}
