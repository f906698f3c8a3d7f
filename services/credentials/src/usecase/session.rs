use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::domain::repository::SessionRepository;
use crate::domain::types::{NewSession, Session};
use crate::error::CredentialError;
use crate::token::{generate_token, hash_token};

/// Request metadata recorded on a session. Never used for authorization.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// A freshly minted session. `token` is the only copy of the raw bearer token.
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub session: Session,
}

async fn mint<S: SessionRepository>(
    sessions: &S,
    clock: &dyn Clock,
    account_id: &str,
    ttl: Option<Duration>,
    client: &ClientInfo,
) -> Result<IssuedSession, CredentialError> {
    let token = generate_token();
    let new = NewSession {
        id: None,
        account_id: account_id.to_owned(),
        token_hash: hash_token(&token),
        expires_at: ttl.map(|ttl| clock.now() + ttl),
        user_agent: client.user_agent.clone(),
        ip_address: client.ip_address.clone(),
    };
    let session = sessions.create_session(&new).await?;
    Ok(IssuedSession { token, session })
}

// ── IssueSession (login) ─────────────────────────────────────────────────────

pub struct IssueSessionUseCase<S: SessionRepository> {
    pub sessions: S,
    pub clock: Arc<dyn Clock>,
    /// `None` uses the default 24h lifetime.
    pub ttl: Option<Duration>,
}

impl<S: SessionRepository> IssueSessionUseCase<S> {
    pub async fn execute(
        &self,
        account_id: &str,
        client: &ClientInfo,
    ) -> Result<IssuedSession, CredentialError> {
        mint(&self.sessions, self.clock.as_ref(), account_id, self.ttl, client).await
    }
}

// ── Authenticate ─────────────────────────────────────────────────────────────

pub struct AuthenticateUseCase<S: SessionRepository> {
    pub sessions: S,
}

impl<S: SessionRepository> AuthenticateUseCase<S> {
    /// Resolve a presented bearer token to its live session and record the use.
    pub async fn execute(&self, token: &str) -> Result<Session, CredentialError> {
        let token_hash = hash_token(token);
        let session = self
            .sessions
            .get_session_by_token(&token_hash)
            .await?
            .ok_or(CredentialError::NotFound)?;
        self.sessions.update_session_last_used(&token_hash).await?;
        Ok(session)
    }
}

// ── RotateSession (refresh) ──────────────────────────────────────────────────

pub struct RotateSessionUseCase<S: SessionRepository> {
    pub sessions: S,
    pub clock: Arc<dyn Clock>,
    pub ttl: Option<Duration>,
}

impl<S: SessionRepository> RotateSessionUseCase<S> {
    /// Swap a live token for a new one on the same account. The old session is
    /// deactivated only after the new one exists.
    pub async fn execute(
        &self,
        old_token: &str,
        client: &ClientInfo,
    ) -> Result<IssuedSession, CredentialError> {
        let old_hash = hash_token(old_token);
        let old = self
            .sessions
            .get_session_by_token(&old_hash)
            .await?
            .ok_or(CredentialError::NotFound)?;
        let issued = mint(
            &self.sessions,
            self.clock.as_ref(),
            &old.account_id,
            self.ttl,
            client,
        )
        .await?;
        self.sessions.deactivate_session(&old_hash).await?;
        tracing::debug!(old_session = %old.id, new_session = %issued.session.id, "session rotated");
        Ok(issued)
    }
}

// ── RevokeSessions (logout) ──────────────────────────────────────────────────

pub struct RevokeSessionsUseCase<S: SessionRepository> {
    pub sessions: S,
}

impl<S: SessionRepository> RevokeSessionsUseCase<S> {
    pub async fn logout(&self, token: &str) -> Result<(), CredentialError> {
        self.sessions.deactivate_session(&hash_token(token)).await
    }

    /// Password change/reset: end every session of the account.
    pub async fn logout_everywhere(&self, account_id: &str) -> Result<u64, CredentialError> {
        self.sessions.deactivate_all_user_sessions(account_id).await
    }
}
