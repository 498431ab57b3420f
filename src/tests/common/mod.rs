// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::auth::TokenManager;
use crate::cache::{Cache, CacheError, MemoryCache};
use crate::config::SdkConfig;
use crate::helpers::time::Clock;
use crate::transport::{HttpResponse, HttpTransport, TransportError};

pub const CONSUMER_KEY: &str = "consumer-key";
pub const CONSUMER_SECRET: &str = "consumer-secret";
pub const START: i64 = 1_700_000_000;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn token_response(token: &str, expires_in: Value) -> HttpResponse {
    HttpResponse::new(
        StatusCode::OK,
        json!({"access_token": token, "expires_in": expires_in}).to_string(),
    )
}

/// Scripted transport. Replies are served in order; the last one repeats.
pub struct MockTransport {
    script: Vec<Result<HttpResponse, TransportError>>,
    calls: AtomicUsize,
    delay: Duration,
    last_request: Mutex<Option<(String, HeaderMap)>>,
}

impl MockTransport {
    pub fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one reply");
        Self {
            script,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            last_request: Mutex::new(None),
        }
    }

    pub fn token(token: &str, expires_in: i64) -> Self {
        Self::new(vec![Ok(token_response(token, json!(expires_in)))])
    }

    pub fn tokens(tokens: &[&str], expires_in: i64) -> Self {
        Self::new(
            tokens
                .iter()
                .map(|t| Ok(token_response(t, json!(expires_in))))
                .collect(),
        )
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self::new(vec![Ok(HttpResponse::new(status, body.to_string()))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, HeaderMap)> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((url.to_owned(), headers.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script[n.min(self.script.len() - 1)].clone()
    }

    async fn post(&self, url: &str, _body: &Value, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        self.get(url, headers).await
    }
}

/// Memory cache whose operations can be switched to fail.
#[derive(Default)]
pub struct FlakyCache {
    pub inner: MemoryCache,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
    pub sets: AtomicUsize,
}

impl FlakyCache {
    pub fn new(inner: MemoryCache) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

fn unavailable(op: &str) -> CacheError {
    CacheError::Unavailable(format!("simulated {} failure", op))
}

#[async_trait]
impl Cache for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(unavailable("get"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, payload: Value, ttl_seconds: u64) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(unavailable("set"));
        }
        self.inner.set(key, payload, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable("delete"));
        }
        self.inner.delete(key).await
    }
}

/// Memory cache whose reads take `delay` after the value has been looked up.
pub struct SlowCache {
    pub inner: MemoryCache,
    delay: Duration,
}

impl SlowCache {
    pub fn new(inner: MemoryCache, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Cache for SlowCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let value = self.inner.get(key).await;
        tokio::time::sleep(self.delay).await;
        value
    }

    async fn set(&self, key: &str, payload: Value, ttl_seconds: u64) -> Result<(), CacheError> {
        self.inner.set(key, payload, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }
}

pub fn sandbox_config() -> SdkConfig {
    SdkConfig::sandbox(CONSUMER_KEY, CONSUMER_SECRET)
}

pub fn build_manager(
    config: SdkConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
) -> TokenManager {
    TokenManager::builder(config)
        .transport(transport)
        .cache(cache)
        .clock(clock)
        .build()
        .expect("token manager")
}

/// Sandbox manager over a fresh memory cache and a manual clock at `START`.
pub fn manager_with(transport: Arc<MockTransport>) -> (TokenManager, MemoryCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let cache = MemoryCache::new(clock.clone());
    let manager = build_manager(sandbox_config(), transport, Arc::new(cache.clone()), clock.clone());
    (manager, cache, clock)
}
