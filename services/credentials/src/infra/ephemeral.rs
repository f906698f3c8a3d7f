//! OTP and session state machines over a [`KeyValueStore`].
//!
//! Key layout:
//!
//! | Key | Value |
//! |-----|-------|
//! | `otp:{email}:{purpose}` | code |
//! | `otp_data:{email}:{purpose}` | JSON [`Otp`] |
//! | `otp_attempts:{email}:{purpose}` | failed attempts (integer string) |
//! | `session:{token_hash}` | JSON [`Session`] |
//! | `user_sessions:{account_id}` | set of token hashes |
//! | `session_last_used:{token_hash}` | unix timestamp |
//!
//! Expiry is native per key; `expires_at` inside each payload is still checked on read
//! so behaviour matches the durable tier to the second.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::repository::{OtpRepository, SessionRepository};
use crate::domain::store::{KeyTtl, KeyValueStore};
use crate::domain::types::{
    NewSession, Otp, OtpPurpose, SESSION_TTL_REFRESH_THRESHOLD_SECS, Session, otp_ttl,
};
use crate::error::CredentialError;
use crate::token::generate_otp_code;

pub fn otp_code_key(email: &str, purpose: OtpPurpose) -> String {
    format!("otp:{email}:{purpose}")
}

pub fn otp_data_key(email: &str, purpose: OtpPurpose) -> String {
    format!("otp_data:{email}:{purpose}")
}

pub fn otp_attempts_key(email: &str, purpose: OtpPurpose) -> String {
    format!("otp_attempts:{email}:{purpose}")
}

pub fn session_key(token_hash: &str) -> String {
    format!("session:{token_hash}")
}

pub fn user_sessions_key(account_id: &str) -> String {
    format!("user_sessions:{account_id}")
}

pub fn session_last_used_key(token_hash: &str) -> String {
    format!("session_last_used:{token_hash}")
}

const USER_SESSIONS_PATTERN: &str = "user_sessions:*";

/// Remaining lifetime until `expires_at`, or `None` once it has passed.
fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<StdDuration> {
    (expires_at - now).to_std().ok().filter(|d| !d.is_zero())
}

// ── OTP ──────────────────────────────────────────────────────────────────────

pub struct EphemeralOtpRepository<S: KeyValueStore> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> EphemeralOtpRepository<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn keys(email: &str, purpose: OtpPurpose) -> Vec<String> {
        vec![
            otp_code_key(email, purpose),
            otp_data_key(email, purpose),
            otp_attempts_key(email, purpose),
        ]
    }

    async fn load_attempts(&self, email: &str, purpose: OtpPurpose) -> Result<i64, CredentialError> {
        match self.store.get(&otp_attempts_key(email, purpose)).await? {
            Some(raw) => raw
                .parse()
                .map_err(|e| CredentialError::corrupt("otp attempts counter", e)),
            None => Ok(0),
        }
    }
}

impl<S: KeyValueStore> OtpRepository for EphemeralOtpRepository<S> {
    async fn create_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, CredentialError> {
        self.store.delete(&Self::keys(email, purpose)).await?;

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
        let ttl = otp_ttl()
            .to_std()
            .map_err(|e| CredentialError::corrupt("otp ttl", e))?;
        let payload =
            serde_json::to_string(&otp).map_err(|e| CredentialError::corrupt("otp payload", e))?;

        // Counter first, payload last: an interrupted create reads as "not found".
        self.store
            .set(&otp_attempts_key(email, purpose), "0", ttl)
            .await?;
        self.store
            .set(&otp_code_key(email, purpose), &otp.code, ttl)
            .await?;
        self.store
            .set(&otp_data_key(email, purpose), &payload, ttl)
            .await?;

        tracing::debug!(%purpose, otp_id = %otp.id, "otp created");
        Ok(otp)
    }

    async fn get_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, CredentialError> {
        let Some(raw) = self.store.get(&otp_data_key(email, purpose)).await? else {
            return Ok(None);
        };
        let mut otp: Otp =
            serde_json::from_str(&raw).map_err(|e| CredentialError::corrupt("otp payload", e))?;
        otp.attempts = self.load_attempts(email, purpose).await?;
        Ok(Some(otp))
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
            self.delete_otp(email, purpose).await?;
            return Err(CredentialError::Expired);
        }
        if otp.is_exhausted() {
            tracing::info!(%purpose, otp_id = %otp.id, "otp attempts exhausted");
            self.delete_otp(email, purpose).await?;
            return Err(CredentialError::AttemptsExhausted);
        }
        if !bool::from(otp.code.as_bytes().ct_eq(code.as_bytes())) {
            let key = otp_attempts_key(email, purpose);
            let attempts = self.store.increment(&key).await?;
            // INCR on a missing key creates it without expiry.
            if let Some(ttl) = remaining(otp.expires_at, now) {
                self.store.expire(&key, ttl).await?;
            }
            tracing::debug!(%purpose, otp_id = %otp.id, attempts, "otp mismatch");
            return Err(CredentialError::Mismatch);
        }
        Ok(otp)
    }

    async fn delete_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), CredentialError> {
        self.store.delete(&Self::keys(email, purpose)).await?;
        Ok(())
    }

    /// Native key expiry already removes OTPs.
    async fn cleanup_expired_otps(&self) -> Result<u64, CredentialError> {
        Ok(0)
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct EphemeralSessionRepository<S: KeyValueStore> {
    pub store: S,
    pub clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> EphemeralSessionRepository<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Raw payload with the side-key last-used timestamp merged in.
    async fn load(&self, token_hash: &str) -> Result<Option<Session>, CredentialError> {
        let Some(raw) = self.store.get(&session_key(token_hash)).await? else {
            return Ok(None);
        };
        let mut session: Session = serde_json::from_str(&raw)
            .map_err(|e| CredentialError::corrupt("session payload", e))?;
        if let Some(ts) = self.store.get(&session_last_used_key(token_hash)).await? {
            let secs: i64 = ts
                .parse()
                .map_err(|e| CredentialError::corrupt("session last-used", e))?;
            if let Some(at) = DateTime::<Utc>::from_timestamp(secs, 0) {
                session.last_used_at = session.last_used_at.max(at);
            }
        }
        Ok(Some(session))
    }

    async fn remove(&self, token_hash: &str, account_id: &str) -> Result<(), CredentialError> {
        self.store
            .delete(&[session_key(token_hash), session_last_used_key(token_hash)])
            .await?;
        self.store
            .set_remove(&user_sessions_key(account_id), &[token_hash.to_owned()])
            .await?;
        Ok(())
    }

    /// Keep the account index alive at least as long as its longest-lived member.
    async fn extend_index(&self, account_id: &str, ttl: StdDuration) -> Result<(), CredentialError> {
        let key = user_sessions_key(account_id);
        let extend = match self.store.ttl(&key).await? {
            KeyTtl::Expires(current) => current < ttl,
            KeyTtl::Persistent | KeyTtl::Missing => true,
        };
        if extend {
            self.store.expire(&key, ttl).await?;
        }
        Ok(())
    }
}

impl<S: KeyValueStore> SessionRepository for EphemeralSessionRepository<S> {
    async fn create_session(&self, new: &NewSession) -> Result<Session, CredentialError> {
        let now = self.clock.now();
        let session = new.into_session(now)?;
        let ttl = remaining(session.expires_at, now).ok_or(CredentialError::InvalidExpiry)?;
        let payload = serde_json::to_string(&session)
            .map_err(|e| CredentialError::corrupt("session payload", e))?;

        if self.store.exists(&[session_key(&session.token_hash)]).await? > 0 {
            return Err(CredentialError::TokenAlreadyExists);
        }

        // Index first: a dangling index entry is pruned later, an unindexed session
        // would escape bulk revocation.
        self.store
            .set_add(
                &user_sessions_key(&session.account_id),
                &[session.token_hash.clone()],
            )
            .await?;
        self.extend_index(&session.account_id, ttl).await?;
        self.store
            .set(
                &session_last_used_key(&session.token_hash),
                &now.timestamp().to_string(),
                ttl,
            )
            .await?;
        self.store
            .set(&session_key(&session.token_hash), &payload, ttl)
            .await?;

        tracing::debug!(session_id = %session.id, account_id = %session.account_id, "session created");
        Ok(session)
    }

    async fn get_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, CredentialError> {
        let Some(session) = self.load(token_hash).await? else {
            return Ok(None);
        };
        if !session.is_active {
            return Ok(None);
        }
        if session.is_expired_at(self.clock.now()) {
            tracing::debug!(session_id = %session.id, "session expired; deactivating");
            self.remove(token_hash, &session.account_id).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn get_sessions_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, CredentialError> {
        let index = user_sessions_key(account_id);
        let now = self.clock.now();
        let mut live = Vec::new();
        let mut stale = Vec::new();
        for hash in self.store.set_members(&index).await? {
            match self.load(&hash).await? {
                Some(session) if session.is_live_at(now) => live.push(session),
                _ => stale.push(hash),
            }
        }
        if !stale.is_empty() {
            self.store.set_remove(&index, &stale).await?;
        }
        live.sort_by_key(|s| s.created_at);
        Ok(live)
    }

    async fn update_session_last_used(&self, token_hash: &str) -> Result<(), CredentialError> {
        let session = self
            .get_session_by_token(token_hash)
            .await?
            .ok_or(CredentialError::NotFound)?;
        let now = self.clock.now();
        let lifetime = remaining(session.expires_at, now).ok_or(CredentialError::NotFound)?;

        self.store
            .set(
                &session_last_used_key(token_hash),
                &now.timestamp().to_string(),
                lifetime,
            )
            .await?;

        let key = session_key(token_hash);
        let threshold = Duration::seconds(SESSION_TTL_REFRESH_THRESHOLD_SECS)
            .to_std()
            .map_err(|e| CredentialError::corrupt("refresh threshold", e))?;
        let refresh = match self.store.ttl(&key).await? {
            KeyTtl::Expires(current) => current < threshold && current < lifetime,
            KeyTtl::Persistent => true,
            KeyTtl::Missing => false,
        };
        if refresh {
            tracing::debug!(session_id = %session.id, "re-aligning session ttl");
            self.store.expire(&key, lifetime).await?;
        }
        Ok(())
    }

    async fn deactivate_session(&self, token_hash: &str) -> Result<(), CredentialError> {
        let Some(session) = self.load(token_hash).await? else {
            // Payload gone already; make sure nothing lingers.
            self.store
                .delete(&[session_last_used_key(token_hash)])
                .await?;
            return Ok(());
        };
        self.remove(token_hash, &session.account_id).await
    }

    async fn deactivate_all_user_sessions(
        &self,
        account_id: &str,
    ) -> Result<u64, CredentialError> {
        let index = user_sessions_key(account_id);
        let members = self.store.set_members(&index).await?;
        let total = members.len();
        let mut deactivated = 0u64;
        let mut failed = 0usize;
        for hash in &members {
            match self.deactivate_session(hash).await {
                Ok(()) => deactivated += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = %e, account_id, "session deactivation failed");
                }
            }
        }
        if failed > 0 {
            return Err(CredentialError::BackendUnavailable(anyhow::anyhow!(
                "{failed} of {total} session deactivations failed for account {account_id}"
            )));
        }
        // Only the enumerated members; a session created meanwhile stays indexed.
        self.store.set_remove(&index, &members).await?;
        tracing::info!(account_id, deactivated, "all sessions deactivated");
        Ok(deactivated)
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, CredentialError> {
        let mut pruned = 0u64;
        for index in self.store.scan(USER_SESSIONS_PATTERN).await? {
            let members = self.store.set_members(&index).await?;
            let mut dangling = Vec::new();
            for hash in members {
                if self.store.exists(&[session_key(&hash)]).await? == 0 {
                    dangling.push(hash);
                }
            }
            if !dangling.is_empty() {
                pruned += self.store.set_remove(&index, &dangling).await?;
            }
        }
        if pruned > 0 {
            tracing::info!(pruned, "pruned dangling session index entries");
        }
        Ok(pruned)
    }
}
