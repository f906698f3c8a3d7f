/// Credential lifecycle error variants.
///
/// "Not found" on a plain lookup is `Ok(None)`, not an error. `NotFound` is only
/// returned by operations that require the credential to exist (validation, touch).
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential not found")]
    NotFound,
    #[error("credential expired")]
    Expired,
    #[error("too many attempts")]
    AttemptsExhausted,
    #[error("code mismatch")]
    Mismatch,
    #[error("expiry is already in the past")]
    InvalidExpiry,
    #[error("session token already in use")]
    TokenAlreadyExists,
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("backend unavailable")]
    BackendUnavailable(#[from] anyhow::Error),
}

impl CredentialError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Expired => "EXPIRED",
            Self::AttemptsExhausted => "ATTEMPTS_EXHAUSTED",
            Self::Mismatch => "MISMATCH",
            Self::InvalidExpiry => "INVALID_EXPIRY",
            Self::TokenAlreadyExists => "TOKEN_ALREADY_EXISTS",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
        }
    }

    /// Outcomes that mean "the presented credential is not acceptable".
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Expired | Self::AttemptsExhausted | Self::Mismatch
        )
    }

    /// Infrastructure failures: the store could not give an answer.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::ValidationFailed(_) | Self::Timeout
        )
    }

    /// Kind safe to expose to end users. Every authentication failure collapses into
    /// one code so the response does not reveal which check failed.
    pub fn public_kind(&self) -> &'static str {
        if self.is_auth_failure() {
            "INVALID_CREDENTIAL"
        } else if self.is_backend_failure() {
            "UNAVAILABLE"
        } else if matches!(self, Self::TokenAlreadyExists) {
            "CONFLICT"
        } else {
            "BAD_REQUEST"
        }
    }

    pub(crate) fn corrupt(what: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, what, "corrupt credential record");
        Self::ValidationFailed(format!("{what}: {err}"))
    }
}
