use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use crate::clock::{Clock, SystemClock};
use crate::infra::cache::RedisStore;
use crate::infra::db::{DbOtpStore, DbSessionStore};
use crate::infra::durable::{DurableOtpRepository, DurableSessionRepository};
use crate::infra::ephemeral::{EphemeralOtpRepository, EphemeralSessionRepository};
use crate::infra::hybrid::{HybridConfig, HybridCredentialRepository};

pub type CredentialRepository = HybridCredentialRepository<
    EphemeralOtpRepository<RedisStore>,
    EphemeralSessionRepository<RedisStore>,
    DurableOtpRepository<DbOtpStore>,
    DurableSessionRepository<DbSessionStore>,
>;

/// Shared connections from which the credential repositories are built.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub hybrid: HybridConfig,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, redis: RedisPool, hybrid: HybridConfig) -> Self {
        Self {
            db,
            redis,
            hybrid,
            clock: Arc::new(SystemClock),
        }
    }

    fn redis_store(&self) -> RedisStore {
        RedisStore {
            pool: self.redis.clone(),
        }
    }

    pub fn credentials(&self) -> CredentialRepository {
        HybridCredentialRepository {
            cache_otps: EphemeralOtpRepository::new(self.redis_store(), self.clock.clone()),
            cache_sessions: EphemeralSessionRepository::new(self.redis_store(), self.clock.clone()),
            durable_otps: DurableOtpRepository::new(
                DbOtpStore {
                    db: self.db.clone(),
                },
                self.clock.clone(),
            ),
            durable_sessions: DurableSessionRepository::new(
                DbSessionStore {
                    db: self.db.clone(),
                },
                self.clock.clone(),
            ),
            config: self.hybrid.clone(),
        }
    }
}
