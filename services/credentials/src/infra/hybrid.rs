//! Stateless router between the cache tier and the durable tier.
//!
//! Each credential class has a primary tier. When the cache is primary and a call
//! fails, the same call is retried once against the durable tier. Nothing is copied
//! between tiers: a durable read after a cache failure does not repopulate the cache.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::repository::{OtpRepository, SessionRepository};
use crate::domain::types::{NewSession, Otp, OtpPurpose, Session};
use crate::error::CredentialError;

/// Which errors from the primary tier send a call to the durable tier.
///
/// The default deliberately narrows fallback to infrastructure failures. Retrying a
/// `Mismatch` or `NotFound` from the cache against the durable tier lets a tier that
/// never held the credential answer for it. Set [`FallbackPolicy::AnyError`]
/// (`FALLBACK_POLICY=any`) to fall back on every error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Only infrastructure failures. Domain outcomes from the primary are final.
    #[default]
    BackendErrors,
    /// Every error, including `NotFound`/`Mismatch`. The durable tier then answers
    /// for a credential it may never have held.
    AnyError,
}

impl FallbackPolicy {
    pub fn should_fall_back(&self, err: &CredentialError) -> bool {
        match self {
            Self::BackendErrors => err.is_backend_failure(),
            Self::AnyError => true,
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backend" => Ok(Self::BackendErrors),
            "any" => Ok(Self::AnyError),
            other => Err(format!("expected `backend` or `any`, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialClass {
    Otp,
    Session,
}

impl fmt::Display for CredentialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Otp => "otp",
            Self::Session => "session",
        })
    }
}

#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub use_cache_for_otp: bool,
    pub use_cache_for_session: bool,
    /// Upper bound on a single tier call.
    pub operation_timeout: Duration,
    pub fallback_policy: FallbackPolicy,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            use_cache_for_otp: true,
            use_cache_for_session: true,
            operation_timeout: Duration::from_secs(2),
            fallback_policy: FallbackPolicy::default(),
        }
    }
}

impl HybridConfig {
    pub fn uses_cache(&self, class: CredentialClass) -> bool {
        match class {
            CredentialClass::Otp => self.use_cache_for_otp,
            CredentialClass::Session => self.use_cache_for_session,
        }
    }
}

pub struct HybridCredentialRepository<CO, CS, DO, DS> {
    pub cache_otps: CO,
    pub cache_sessions: CS,
    pub durable_otps: DO,
    pub durable_sessions: DS,
    pub config: HybridConfig,
}

/// Run one store call, giving up with [`CredentialError::Timeout`] after `limit`.
/// The call is dropped on timeout.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, CredentialError>>,
) -> Result<T, CredentialError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CredentialError::Timeout)?
}

impl<CO, CS, DO, DS> HybridCredentialRepository<CO, CS, DO, DS> {
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CredentialError>>,
    ) -> Result<T, CredentialError> {
        bounded(self.config.operation_timeout, call).await
    }

    /// Primary then (maybe) durable; never more than one retry, never durable first.
    async fn route<T, C, D>(
        &self,
        class: CredentialClass,
        op: &'static str,
        cache: impl FnOnce() -> C,
        durable: impl FnOnce() -> D,
    ) -> Result<T, CredentialError>
    where
        C: Future<Output = Result<T, CredentialError>>,
        D: Future<Output = Result<T, CredentialError>>,
    {
        if !self.config.uses_cache(class) {
            return self.bounded(durable()).await;
        }
        match self.bounded(cache()).await {
            Err(e) if self.config.fallback_policy.should_fall_back(&e) => {
                tracing::warn!(%class, op, error = %e, "cache tier failed; falling back to durable tier");
                self.bounded(durable()).await
            }
            result => result,
        }
    }
}

impl<CO, CS, DO, DS> OtpRepository for HybridCredentialRepository<CO, CS, DO, DS>
where
    CO: OtpRepository,
    CS: SessionRepository,
    DO: OtpRepository,
    DS: SessionRepository,
{
    async fn create_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, CredentialError> {
        self.route(
            CredentialClass::Otp,
            "create_otp",
            || self.cache_otps.create_otp(email, purpose),
            || self.durable_otps.create_otp(email, purpose),
        )
        .await
    }

    async fn get_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, CredentialError> {
        self.route(
            CredentialClass::Otp,
            "get_otp",
            || self.cache_otps.get_otp(email, purpose),
            || self.durable_otps.get_otp(email, purpose),
        )
        .await
    }

    async fn validate_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Otp, CredentialError> {
        self.route(
            CredentialClass::Otp,
            "validate_otp",
            || self.cache_otps.validate_otp(email, purpose, code),
            || self.durable_otps.validate_otp(email, purpose, code),
        )
        .await
    }

    async fn delete_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), CredentialError> {
        self.route(
            CredentialClass::Otp,
            "delete_otp",
            || self.cache_otps.delete_otp(email, purpose),
            || self.durable_otps.delete_otp(email, purpose),
        )
        .await
    }

    async fn cleanup_expired_otps(&self) -> Result<u64, CredentialError> {
        self.route(
            CredentialClass::Otp,
            "cleanup_expired_otps",
            || self.cache_otps.cleanup_expired_otps(),
            || self.durable_otps.cleanup_expired_otps(),
        )
        .await
    }
}

impl<CO, CS, DO, DS> SessionRepository for HybridCredentialRepository<CO, CS, DO, DS>
where
    CO: OtpRepository,
    CS: SessionRepository,
    DO: OtpRepository,
    DS: SessionRepository,
{
    async fn create_session(&self, new: &NewSession) -> Result<Session, CredentialError> {
        self.route(
            CredentialClass::Session,
            "create_session",
            || self.cache_sessions.create_session(new),
            || self.durable_sessions.create_session(new),
        )
        .await
    }

    async fn get_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, CredentialError> {
        self.route(
            CredentialClass::Session,
            "get_session_by_token",
            || self.cache_sessions.get_session_by_token(token_hash),
            || self.durable_sessions.get_session_by_token(token_hash),
        )
        .await
    }

    async fn get_sessions_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, CredentialError> {
        self.route(
            CredentialClass::Session,
            "get_sessions_by_account_id",
            || self.cache_sessions.get_sessions_by_account_id(account_id),
            || self.durable_sessions.get_sessions_by_account_id(account_id),
        )
        .await
    }

    async fn update_session_last_used(&self, token_hash: &str) -> Result<(), CredentialError> {
        self.route(
            CredentialClass::Session,
            "update_session_last_used",
            || self.cache_sessions.update_session_last_used(token_hash),
            || self.durable_sessions.update_session_last_used(token_hash),
        )
        .await
    }

    async fn deactivate_session(&self, token_hash: &str) -> Result<(), CredentialError> {
        self.route(
            CredentialClass::Session,
            "deactivate_session",
            || self.cache_sessions.deactivate_session(token_hash),
            || self.durable_sessions.deactivate_session(token_hash),
        )
        .await
    }

    async fn deactivate_all_user_sessions(
        &self,
        account_id: &str,
    ) -> Result<u64, CredentialError> {
        self.route(
            CredentialClass::Session,
            "deactivate_all_user_sessions",
            || self.cache_sessions.deactivate_all_user_sessions(account_id),
            || self.durable_sessions.deactivate_all_user_sessions(account_id),
        )
        .await
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, CredentialError> {
        self.route(
            CredentialClass::Session,
            "cleanup_expired_sessions",
            || self.cache_sessions.cleanup_expired_sessions(),
            || self.durable_sessions.cleanup_expired_sessions(),
        )
        .await
    }
}
