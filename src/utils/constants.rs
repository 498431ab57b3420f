//! Shared constants and invariants

/// Subtracted from the provider-declared lifetime before a token is stored.
pub const SAFETY_MARGIN_SECS: i64 = 60;
/// Lifetime assumed when the token response carries no `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Window used by `will_expire_soon`.
pub const EXPIRY_LOOKAHEAD_SECS: i64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

pub const CACHE_KEY_PREFIX: &str = "mpesa_token_";
pub const CACHE_DIR_NAME: &str = "mpesa_cache";
pub const CACHE_FILE_EXTENSION: &str = "cache";

pub const GRANT_TYPE_QUERY: &str = "grant_type=client_credentials";
pub const USER_AGENT: &str = concat!("mpesa-auth/", env!("CARGO_PKG_VERSION"));

// Supported cache kinds
pub const CACHE_FILE: &str = "file";
pub const CACHE_MEMORY: &str = "memory";
