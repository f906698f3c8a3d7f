//! Contracts of the two storage collaborators the state machines are written against.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::OtpPurpose;
use crate::error::CredentialError;

/// Remaining lifetime of an ephemeral key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Expires(Duration),
}

/// Fast key-value backend with native per-key expiry and atomic counters.
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CredentialError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;

    /// Returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CredentialError>;

    /// Returns how many of `keys` exist.
    async fn exists(&self, keys: &[String]) -> Result<u64, CredentialError>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CredentialError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CredentialError>;

    /// Atomically add one, creating the key at 0 first if missing.
    async fn increment(&self, key: &str) -> Result<i64, CredentialError>;

    async fn set_add(&self, key: &str, members: &[String]) -> Result<u64, CredentialError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CredentialError>;

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, CredentialError>;

    /// All keys matching a glob pattern (cursor based; may be slow on large keyspaces).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CredentialError>;
}

/// Document-oriented backend without native TTL.
pub trait DocumentStore: Send + Sync {
    type Document;
    type Filter;
    type Patch;

    async fn create(&self, doc: &Self::Document) -> Result<(), CredentialError>;

    async fn find_one(&self, filter: &Self::Filter)
    -> Result<Option<Self::Document>, CredentialError>;

    async fn find(&self, filter: &Self::Filter) -> Result<Vec<Self::Document>, CredentialError>;

    /// Returns the number of documents changed.
    async fn update(&self, filter: &Self::Filter, patch: &Self::Patch)
    -> Result<u64, CredentialError>;

    /// Returns the number of documents removed.
    async fn delete(&self, filter: &Self::Filter) -> Result<u64, CredentialError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpFilter {
    Key { email: String, purpose: OtpPurpose },
    Id(Uuid),
    /// `expires_at <= at`
    ExpiredAt(DateTime<Utc>),
}

impl OtpFilter {
    pub fn key(email: &str, purpose: OtpPurpose) -> Self {
        Self::Key {
            email: email.to_owned(),
            purpose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpPatch {
    /// `attempts = attempts + 1`, applied by the store in one statement.
    IncrementAttempts { updated_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFilter {
    /// `token_hash = ? AND is_active`
    ActiveTokenHash(String),
    /// `account_id = ? AND is_active`
    ActiveForAccount(String),
    /// `expires_at <= at OR NOT is_active`
    Stale(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPatch {
    Touch { last_used_at: DateTime<Utc> },
    Deactivate,
}
