//! OTP and session state machines over a [`DocumentStore`]. The store has no TTL, so
//! every read compares `expires_at` against the clock.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::repository::{OtpRepository, SessionRepository};
use crate::domain::store::{DocumentStore, OtpFilter, OtpPatch, SessionFilter, SessionPatch};
use crate::domain::types::{NewSession, Otp, OtpPurpose, Session, otp_ttl};
use crate::error::CredentialError;
use crate::token::generate_otp_code;

// ── OTP ──────────────────────────────────────────────────────────────────────

pub struct DurableOtpRepository<D>
where
    D: DocumentStore<Document = Otp, Filter = OtpFilter, Patch = OtpPatch>,
{
    pub store: D,
    pub clock: Arc<dyn Clock>,
}

impl<D> DurableOtpRepository<D>
where
    D: DocumentStore<Document = Otp, Filter = OtpFilter, Patch = OtpPatch>,
{
    pub fn new(store: D, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl<D> OtpRepository for DurableOtpRepository<D>
where
    D: DocumentStore<Document = Otp, Filter = OtpFilter, Patch = OtpPatch>,
{
    async fn create_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, CredentialError> {
        self.store.delete(&OtpFilter::key(email, purpose)).await?;

        let now = self.clock.now();
        let otp = Otp {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            purpose,
            code: generate_otp_code(),
            attempts: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + otp_ttl(),
        };
        self.store.create(&otp).await?;

        tracing::debug!(%purpose, otp_id = %otp.id, "otp created");
        Ok(otp)
    }

    async fn get_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, CredentialError> {
        self.store.find_one(&OtpFilter::key(email, purpose)).await
    }

    async fn validate_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Otp, CredentialError> {
        let otp = self
            .get_otp(email, purpose)
            .await?
            .ok_or(CredentialError::NotFound)?;

        let now = self.clock.now();
        if otp.is_expired_at(now) {
            self.store.delete(&OtpFilter::Id(otp.id)).await?;
            return Err(CredentialError::Expired);
        }
        if otp.is_exhausted() {
            tracing::info!(%purpose, otp_id = %otp.id, "otp attempts exhausted");
            self.store.delete(&OtpFilter::Id(otp.id)).await?;
            return Err(CredentialError::AttemptsExhausted);
        }
        if !bool::from(otp.code.as_bytes().ct_eq(code.as_bytes())) {
            // The increment itself is atomic; the exhaustion check above is not, so two
            // racing mismatches can both pass it.
            self.store
                .update(
                    &OtpFilter::Id(otp.id),
                    &OtpPatch::IncrementAttempts { updated_at: now },
                )
                .await?;
            tracing::debug!(%purpose, otp_id = %otp.id, "otp mismatch");
            return Err(CredentialError::Mismatch);
        }
        Ok(otp)
    }

    async fn delete_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), CredentialError> {
        self.store.delete(&OtpFilter::key(email, purpose)).await?;
        Ok(())
    }

    async fn cleanup_expired_otps(&self) -> Result<u64, CredentialError> {
        let now = self.clock.now();
        let expired = self.store.find(&OtpFilter::ExpiredAt(now)).await?;
        let mut removed = 0;
        for otp in expired {
            removed += self.store.delete(&OtpFilter::Id(otp.id)).await?;
        }
        if removed > 0 {
            tracing::info!(removed, "expired otps removed");
        }
        Ok(removed)
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct DurableSessionRepository<D>
where
    D: DocumentStore<Document = Session, Filter = SessionFilter, Patch = SessionPatch>,
{
    pub store: D,
    pub clock: Arc<dyn Clock>,
}

impl<D> DurableSessionRepository<D>
where
    D: DocumentStore<Document = Session, Filter = SessionFilter, Patch = SessionPatch>,
{
    pub fn new(store: D, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl<D> SessionRepository for DurableSessionRepository<D>
where
    D: DocumentStore<Document = Session, Filter = SessionFilter, Patch = SessionPatch>,
{
    async fn create_session(&self, new: &NewSession) -> Result<Session, CredentialError> {
        let session = new.into_session(self.clock.now())?;
        self.store.create(&session).await?;
        tracing::debug!(session_id = %session.id, account_id = %session.account_id, "session created");
        Ok(session)
    }

    async fn get_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, CredentialError> {
        let filter = SessionFilter::ActiveTokenHash(token_hash.to_owned());
        let Some(session) = self.store.find_one(&filter).await? else {
            return Ok(None);
        };
        if session.is_expired_at(self.clock.now()) {
            tracing::debug!(session_id = %session.id, "session expired; deactivating");
            self.store
                .update(&filter, &SessionPatch::Deactivate)
                .await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn get_sessions_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, CredentialError> {
        let now = self.clock.now();
        let mut live: Vec<Session> = self
            .store
            .find(&SessionFilter::ActiveForAccount(account_id.to_owned()))
            .await?
            .into_iter()
            .filter(|s| s.is_live_at(now))
            .collect();
        live.sort_by_key(|s| s.created_at);
        Ok(live)
    }

    async fn update_session_last_used(&self, token_hash: &str) -> Result<(), CredentialError> {
        let session = self
            .get_session_by_token(token_hash)
            .await?
            .ok_or(CredentialError::NotFound)?;
        let touched = self
            .store
            .update(
                &SessionFilter::ActiveTokenHash(session.token_hash),
                &SessionPatch::Touch {
                    last_used_at: self.clock.now(),
                },
            )
            .await?;
        if touched == 0 {
            return Err(CredentialError::NotFound);
        }
        Ok(())
    }

    async fn deactivate_session(&self, token_hash: &str) -> Result<(), CredentialError> {
        self.store
            .update(
                &SessionFilter::ActiveTokenHash(token_hash.to_owned()),
                &SessionPatch::Deactivate,
            )
            .await?;
        Ok(())
    }

    async fn deactivate_all_user_sessions(
        &self,
        account_id: &str,
    ) -> Result<u64, CredentialError> {
        let sessions = self
            .store
            .find(&SessionFilter::ActiveForAccount(account_id.to_owned()))
            .await?;
        let mut deactivated = 0u64;
        let mut first_error = None;
        for session in &sessions {
            match self.deactivate_session(&session.token_hash).await {
                Ok(()) => deactivated += 1,
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %session.id, "session deactivation failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::info!(account_id, deactivated, "all sessions deactivated");
        Ok(deactivated)
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, CredentialError> {
        let removed = self
            .store
            .delete(&SessionFilter::Stale(self.clock.now()))
            .await?;
        if removed > 0 {
            tracing::info!(removed, "stale sessions removed");
        }
        Ok(removed)
    }
}
