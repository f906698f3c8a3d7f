use std::time::Duration;

use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands, RedisError};

use crate::domain::store::{KeyTtl, KeyValueStore};
use crate::error::CredentialError;

/// [`KeyValueStore`] over a pooled Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    pub pool: Pool,
}

fn unavailable(e: RedisError) -> CredentialError {
    CredentialError::BackendUnavailable(e.into())
}

/// Redis expiries are whole seconds; never round a live key down to "no expiry".
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisStore {
    async fn conn(&self) -> Result<deadpool_redis::Connection, CredentialError> {
        self.pool
            .get()
            .await
            .map_err(|e| CredentialError::BackendUnavailable(e.into()))
    }
}

impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CredentialError> {
        let mut conn = self.conn().await?;
        let (): () = conn
            .set_ex(key, value, ttl_secs(ttl))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CredentialError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(keys).await.map_err(unavailable)?;
        Ok(removed)
    }

    async fn exists(&self, keys: &[String]) -> Result<u64, CredentialError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let count: u64 = conn.exists(keys).await.map_err(unavailable)?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CredentialError> {
        let mut conn = self.conn().await?;
        let applied: bool = conn
            .expire(key, ttl_secs(ttl) as i64)
            .await
            .map_err(unavailable)?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CredentialError> {
        let mut conn = self.conn().await?;
        let secs: i64 = conn.ttl(key).await.map_err(unavailable)?;
        Ok(match secs {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            s => KeyTtl::Expires(Duration::from_secs(s.max(0) as u64)),
        })
    }

    async fn increment(&self, key: &str) -> Result<i64, CredentialError> {
        let mut conn = self.conn().await?;
        let value: i64 = conn.incr(key, 1).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64, CredentialError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let added: u64 = conn.sadd(key, members).await.map_err(unavailable)?;
        Ok(added)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CredentialError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(key).await.map_err(unavailable)?;
        Ok(members)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, CredentialError> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.srem(key, members).await.map_err(unavailable)?;
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CredentialError> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}
