use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CredentialError;

/// Number of digits in an OTP code.
pub const OTP_LENGTH: usize = 6;

/// OTP time-to-live in seconds.
pub const OTP_TTL_SECS: i64 = 300;

/// Failed validations allowed before an OTP is burned.
pub const MAX_OTP_ATTEMPTS: i64 = 5;

/// Session lifetime when the issuer does not pick one, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// When the ephemeral backing TTL of a live session drops below this, it is re-aligned
/// to the session's remaining lifetime on the next touch.
pub const SESSION_TTL_REFRESH_THRESHOLD_SECS: i64 = 60 * 60;

pub fn otp_ttl() -> Duration {
    Duration::seconds(OTP_TTL_SECS)
}

pub fn default_session_ttl() -> Duration {
    Duration::seconds(DEFAULT_SESSION_TTL_SECS)
}

/// What an OTP authorises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_verification" => Ok(Self::EmailVerification),
            "password_reset" => Ok(Self::PasswordReset),
            other => Err(CredentialError::ValidationFailed(format!(
                "unknown otp purpose {other:?}"
            ))),
        }
    }
}

/// One-time passcode. Business key is `(email, purpose)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp {
    pub id: Uuid,
    pub email: String,
    pub purpose: OtpPurpose,
    pub code: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Otp {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_OTP_ATTEMPTS
    }
}

/// Server-side session record. Looked up by the hash of its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub account_id: String,
    pub token_hash: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }
}

/// Input for session creation. Identity and expiry are filled in when absent.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub id: Option<Uuid>,
    pub account_id: String,
    pub token_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl NewSession {
    /// Materialise the session as of `now`.
    ///
    /// Fails with [`CredentialError::InvalidExpiry`] when the requested expiry is not in
    /// the future.
    pub fn into_session(&self, now: DateTime<Utc>) -> Result<Session, CredentialError> {
        let expires_at = self.expires_at.unwrap_or(now + default_session_ttl());
        if expires_at <= now {
            return Err(CredentialError::InvalidExpiry);
        }
        Ok(Session {
            id: self.id.unwrap_or_else(Uuid::now_v7),
            account_id: self.account_id.clone(),
            token_hash: self.token_hash.clone(),
            is_active: true,
            expires_at,
            created_at: now,
            last_used_at: now,
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
        })
    }
}
