#![allow(async_fn_in_trait)]

use crate::domain::types::{NewSession, Otp, OtpPurpose, Session};
use crate::error::CredentialError;

/// OTP lifecycle: `Absent → Active → {Consumed, Expired, AttemptsExhausted} → Absent`.
pub trait OtpRepository: Send + Sync {
    /// Replace any existing OTP for `(email, purpose)` with a fresh one.
    async fn create_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, CredentialError>;

    async fn get_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Otp>, CredentialError>;

    /// Check `code` against the live OTP. A match does not consume it; call
    /// [`OtpRepository::delete_otp`] afterwards.
    ///
    /// Expiry is checked first, then the attempt budget, then the code. Expired and
    /// exhausted OTPs are deleted; a mismatch bumps the attempt counter.
    async fn validate_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Otp, CredentialError>;

    /// Deleting an absent OTP is not an error.
    async fn delete_otp(&self, email: &str, purpose: OtpPurpose) -> Result<(), CredentialError>;

    /// Remove expired OTPs. Returns how many were removed.
    async fn cleanup_expired_otps(&self) -> Result<u64, CredentialError>;
}

/// Session lifecycle: `Active → {Deactivated, Expired}`, both terminal.
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, new: &NewSession) -> Result<Session, CredentialError>;

    /// Returns `None` when absent, inactive or expired. An expired session found here is
    /// deactivated as a side effect.
    async fn get_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, CredentialError>;

    /// Live sessions of an account.
    async fn get_sessions_by_account_id(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, CredentialError>;

    async fn update_session_last_used(&self, token_hash: &str) -> Result<(), CredentialError>;

    /// Not an error when the session is already gone.
    async fn deactivate_session(&self, token_hash: &str) -> Result<(), CredentialError>;

    /// Best-effort bulk revocation. Returns how many sessions were deactivated.
    async fn deactivate_all_user_sessions(&self, account_id: &str)
    -> Result<u64, CredentialError>;

    /// Physically remove expired or inactive sessions. Returns how many were removed.
    async fn cleanup_expired_sessions(&self) -> Result<u64, CredentialError>;
}
