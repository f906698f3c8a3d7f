use std::time::Duration;

use sesame_core::config::{env_flag, env_or, require_env};

use crate::infra::hybrid::{FallbackPolicy, HybridConfig};

/// Credentials service configuration loaded from environment variables.
#[derive(Debug)]
pub struct CredentialsConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Keep OTPs in Redis with Postgres as fallback. Env var: `USE_CACHE_FOR_OTP`.
    pub use_cache_for_otp: bool,
    /// Keep sessions in Redis with Postgres as fallback. Env var: `USE_CACHE_FOR_SESSION`.
    pub use_cache_for_session: bool,
    /// Per store call bound (default 2000). Env var: `CREDENTIAL_OP_TIMEOUT_MS`.
    pub op_timeout_ms: u64,
    /// `backend` (default) or `any`. Env var: `FALLBACK_POLICY`.
    pub fallback_policy: FallbackPolicy,
    /// Seconds between cleanup sweeps (default 300). Env var: `CLEANUP_INTERVAL_SECS`.
    pub cleanup_interval_secs: u64,
}

impl CredentialsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            use_cache_for_otp: env_flag("USE_CACHE_FOR_OTP", true)?,
            use_cache_for_session: env_flag("USE_CACHE_FOR_SESSION", true)?,
            op_timeout_ms: env_or("CREDENTIAL_OP_TIMEOUT_MS", 2000)?,
            fallback_policy: env_or("FALLBACK_POLICY", FallbackPolicy::BackendErrors)?,
            cleanup_interval_secs: env_or("CLEANUP_INTERVAL_SECS", 300)?,
        })
    }

    pub fn hybrid(&self) -> HybridConfig {
        HybridConfig {
            use_cache_for_otp: self.use_cache_for_otp,
            use_cache_for_session: self.use_cache_for_session,
            operation_timeout: Duration::from_millis(self.op_timeout_ms),
            fallback_policy: self.fallback_policy,
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
