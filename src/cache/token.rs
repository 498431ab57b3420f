use serde::{Deserialize, Serialize};

use crate::helpers::time::seconds_until;

/// Bearer token with its safety-margined expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: i64, // UNIX timestamp, margin already applied
}

impl CachedToken {
    pub fn new(value: String, expires_at: i64) -> Self {
        Self { value, expires_at }
    }

    pub fn is_valid(&self, now: i64) -> bool {
        !self.value.is_empty() && now < self.expires_at
    }

    pub fn remaining(&self, now: i64) -> i64 {
        seconds_until(self.expires_at, now)
    }
}
