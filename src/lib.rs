//! # M-Pesa auth library
//!
//! Acquires, caches and reuses OAuth access tokens for the M-Pesa API.
//! Tokens are treated as expired 60 seconds before the provider says so,
//! concurrent callers share a single token request, and the current token
//! is persisted in a pluggable TTL cache so restarts do not burn quota.
//!
//! Modules:
//! - `auth`: token manager and its error type
//! - `cache`: cache trait with file and in-memory backends
//! - `transport`: HTTP request/response abstraction and reqwest client
//! - `config`: SDK configuration, loading and validation
//! - `observability`: prometheus metrics

pub mod auth;
pub mod cache;
pub mod config;
pub mod helpers;
pub mod observability;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::auth::{AuthError, TokenInfo, TokenManager, TokenManagerBuilder};
pub use crate::cache::{Cache, CacheError, CachedToken, FileCache, MemoryCache};
pub use crate::config::{Environment, SdkConfig};
pub use crate::helpers::time::{Clock, SystemClock};
pub use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
