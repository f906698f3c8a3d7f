//! Periodic removal of expired credentials from one storage tier.

use std::time::Duration;

use crate::domain::repository::{OtpRepository, SessionRepository};
use crate::infra::hybrid::bounded;

/// Outcome of one sweep over one tier. `None` means that cleanup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub tier: &'static str,
    pub otps_removed: Option<u64>,
    pub sessions_removed: Option<u64>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.otps_removed.is_some() && self.sessions_removed.is_some()
    }
}

/// Run both cleanups against one tier, each bounded by `limit`. A failing or stalled
/// OTP cleanup does not skip the session cleanup.
pub async fn sweep_tier<O, S>(
    tier: &'static str,
    otps: &O,
    sessions: &S,
    limit: Duration,
) -> SweepReport
where
    O: OtpRepository,
    S: SessionRepository,
{
    let otps_removed = match bounded(limit, otps.cleanup_expired_otps()).await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::error!(tier, error = %e, "otp cleanup failed");
            None
        }
    };
    let sessions_removed = match bounded(limit, sessions.cleanup_expired_sessions()).await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::error!(tier, error = %e, "session cleanup failed");
            None
        }
    };
    let report = SweepReport {
        tier,
        otps_removed,
        sessions_removed,
    };
    tracing::info!(
        tier,
        otps_removed = ?report.otps_removed,
        sessions_removed = ?report.sessions_removed,
        "sweep finished"
    );
    report
}
