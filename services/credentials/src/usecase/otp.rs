use crate::domain::repository::OtpRepository;
use crate::domain::types::{Otp, OtpPurpose};
use crate::error::CredentialError;

/// Canonical form used as the OTP business key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ── IssueOtp ─────────────────────────────────────────────────────────────────

/// Registration, resend, forgot-password: mint a fresh OTP, replacing any prior one.
/// Delivering the code is the caller's job.
pub struct IssueOtpUseCase<O: OtpRepository> {
    pub otps: O,
}

impl<O: OtpRepository> IssueOtpUseCase<O> {
    pub async fn execute(&self, email: &str, purpose: OtpPurpose) -> Result<Otp, CredentialError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CredentialError::ValidationFailed("email is empty".to_owned()));
        }
        self.otps.create_otp(&email, purpose).await
    }
}

// ── VerifyOtp ────────────────────────────────────────────────────────────────

/// Validate and consume in one step.
pub struct VerifyOtpUseCase<O: OtpRepository> {
    pub otps: O,
}

impl<O: OtpRepository> VerifyOtpUseCase<O> {
    pub async fn execute(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Otp, CredentialError> {
        let email = normalize_email(email);
        let otp = self.otps.validate_otp(&email, purpose, code.trim()).await?;
        self.otps.delete_otp(&email, purpose).await?;
        Ok(otp)
    }
}
