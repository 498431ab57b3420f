//! Cache module
//!
//! Key/value storage with per-entry expiry. The token manager only sees the
//! [`Cache`] trait, so the medium (files, process memory, a remote store)
//! can be swapped without touching token logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod file_cache;
pub mod memory_cache;
pub mod token;

pub use file_cache::FileCache;
pub use memory_cache::MemoryCache;
pub use token::CachedToken;

/// Storage failure. A missing or expired key is never an error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache i/o error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache entry for '{key}' could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Payload stored under `key`, or `None` when absent or expired.
    /// Expired entries are removed before the miss is returned.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `payload` for `ttl_seconds`, replacing any previous entry.
    async fn set(&self, key: &str, payload: Value, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Remove `key`; absent keys are fine.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Stored record shared by the bundled backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: i64, // UNIX timestamp
}

impl CacheEntry {
    pub fn new(value: Value, now: i64, ttl_seconds: u64) -> Self {
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        Self {
            value,
            expires_at: now.saturating_add(ttl),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
