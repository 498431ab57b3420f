//! Access-token lifecycle.
//!
//! A [`TokenManager`] hands out bearer tokens for one credential set and
//! environment. Lookups go memory -> cache -> token endpoint. Expiry is
//! checked lazily on every access against the injected [`Clock`]; nothing
//! runs in the background.
//!
//! Acquisition runs as a *flight*: a spawned task whose outcome is published
//! on a `watch` channel. Callers arriving while a flight is running wait on
//! the same channel, so concurrent callers cause at most one call to the
//! token endpoint. Because the flight is its own task, a caller that gives
//! up waiting does not cancel it for the others.
//!
//! Remote requests are serialized separately from flights: a forced
//! generation that arrives while an acquisition is already talking to the
//! endpoint waits for it and reuses its token. `clear_cache` bumps an epoch;
//! flights started before it finish for their own waiters but never write
//! their token back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::error::AuthError;
use crate::cache::{Cache, CachedToken, FileCache, MemoryCache};
use crate::config::proc_validator::validate_sdk_config;
use crate::config::{CacheConfig, CacheKind, Environment, SdkConfig};
use crate::helpers::time::{Clock, SystemClock};
use crate::observability::metrics::get_metrics;
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::utils::constants::{
    CACHE_KEY_PREFIX, DEFAULT_EXPIRES_IN_SECS, EXPIRY_LOOKAHEAD_SECS, GRANT_TYPE_QUERY,
    SAFETY_MARGIN_SECS,
};

static MEMORY_LAYER: &str = "memory";
static CACHE_LAYER: &str = "cache";

type FlightOutcome = Option<Result<String, AuthError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightKind {
    /// cache lookup, then the token endpoint on a miss
    Acquire,
    /// token endpoint only
    Generate,
}

struct Flight {
    kind: FlightKind,
    rx: watch::Receiver<FlightOutcome>,
}

impl Flight {
    fn is_running(&self) -> bool {
        // a closed channel without a value means the task died
        self.rx.borrow().is_none() && self.rx.has_changed().is_ok()
    }
}

/// Snapshot of the current token, as reported by [`TokenManager::token_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub has_token: bool,
    pub expires_at: Option<i64>,
    pub remaining_seconds: i64,
    pub will_expire_soon: bool,
}

/// Token endpoint payload. Some deployments send `expires_in` as a string.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<ExpiresIn>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(i64),
    Text(String),
}

#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    environment: Environment,
    token_url: String,
    basic_auth: HeaderValue,
    cache_key: String,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    token: RwLock<Option<CachedToken>>,
    flight: Mutex<Option<Flight>>,
    // held around the remote request and the store that follows it
    generation: Mutex<()>,
    // successful generations so far
    issued: AtomicU64,
    // bumped by `clear_cache`
    epoch: AtomicU64,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("environment", &self.inner.environment)
            .field("token_url", &self.inner.token_url)
            .field("cache_key", &self.inner.cache_key)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn builder(config: SdkConfig) -> TokenManagerBuilder {
        TokenManagerBuilder::new(config)
    }

    /// Manager with the reqwest transport, the configured cache and the
    /// system clock.
    pub fn from_config(config: SdkConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Deterministic cache key for a client id / environment pair.
    pub fn cache_key_for(consumer_key: &str, environment: Environment) -> String {
        let digest = Sha256::digest(format!("{}:{}", consumer_key, environment.as_str()).as_bytes());
        format!("{}{}", CACHE_KEY_PREFIX, hex::encode(digest))
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    /// A usable bearer token: the in-memory copy, else the cached one, else
    /// a freshly generated one.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        if let Some(value) = self.valid_in_memory().await {
            self.record_hit(MEMORY_LAYER).await;
            return Ok(value);
        }
        match self.join_or_start(FlightKind::Acquire).await {
            Joined::Ready(value) => Ok(value),
            Joined::Wait(rx) => wait_for_outcome(rx).await,
        }
    }

    /// Fetch a new token from the provider regardless of what is held.
    /// Joins a generation that is already running instead of starting a
    /// second one.
    pub async fn generate_access_token(&self) -> Result<String, AuthError> {
        match self.join_or_start(FlightKind::Generate).await {
            Joined::Ready(value) => Ok(value),
            Joined::Wait(rx) => wait_for_outcome(rx).await,
        }
    }

    /// Forget the token in memory and in the cache. A running flight is
    /// detached: its waiters still get its outcome, the manager does not.
    pub async fn clear_cache(&self) {
        let mut slot = self.inner.flight.lock().await;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        slot.take();

        let mut token = self.inner.token.write().await;
        token.take();
        if let Err(err) = self.inner.cache.delete(&self.inner.cache_key).await {
            warn!("failed to delete cached access token: {}", err);
            get_metrics().await.cache_failures.with_label_values(&["delete"]).inc();
        }
        info!(environment = self.inner.environment.as_str(), "access token cache cleared");
    }

    /// True when a token is held and it has less than five minutes left.
    pub async fn will_expire_soon(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .token
            .read()
            .await
            .as_ref()
            .is_some_and(|token| token.expires_at - now < EXPIRY_LOOKAHEAD_SECS)
    }

    /// Seconds until the held token expires, 0 without a valid token.
    pub async fn remaining_lifetime(&self) -> i64 {
        let now = self.inner.clock.now();
        self.inner
            .token
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid(now))
            .map(|token| token.remaining(now))
            .unwrap_or(0)
    }

    /// Safety-margined expiry of the held token.
    pub async fn token_expiry(&self) -> Option<i64> {
        self.inner.token.read().await.as_ref().map(|token| token.expires_at)
    }

    /// `Authorization: Bearer <token>`
    pub async fn authorization_header(&self) -> Result<HeaderMap, AuthError> {
        let token = self.get_access_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuthError::MalformedResponse("token is not a valid header value".to_owned()))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Ensure a token, then report on it.
    pub async fn token_info(&self) -> Result<TokenInfo, AuthError> {
        let token = self.get_access_token().await?;
        Ok(TokenInfo {
            has_token: !token.is_empty(),
            expires_at: self.token_expiry().await,
            remaining_seconds: self.remaining_lifetime().await,
            will_expire_soon: self.will_expire_soon().await,
        })
    }

    /// Whether a token can be obtained with the configured credentials.
    pub async fn test_connection(&self) -> bool {
        match self.get_access_token().await {
            Ok(_) => true,
            Err(err) => {
                error!("connection test failed: {}", err);
                false
            }
        }
    }

    async fn valid_in_memory(&self) -> Option<String> {
        let now = self.inner.clock.now();
        self.inner
            .token
            .read()
            .await
            .as_ref()
            .filter(|token| token.is_valid(now))
            .map(|token| token.value.clone())
    }

    async fn join_or_start(&self, kind: FlightKind) -> Joined {
        let mut slot = self.inner.flight.lock().await;

        // a flight may have finished while we waited for the slot
        if kind == FlightKind::Acquire {
            if let Some(value) = self.valid_in_memory().await {
                self.record_hit(MEMORY_LAYER).await;
                return Joined::Ready(value);
            }
        }

        if let Some(flight) = slot.as_ref() {
            let joinable = kind == FlightKind::Acquire || flight.kind == FlightKind::Generate;
            if joinable && flight.is_running() {
                debug!("joining in-flight token acquisition");
                return Joined::Wait(flight.rx.clone());
            }
        }

        let rx = self.spawn_flight(kind);
        *slot = Some(Flight {
            kind,
            rx: rx.clone(),
        });
        Joined::Wait(rx)
    }

    /// Called with the flight slot locked, so the epoch cannot move under us.
    fn spawn_flight(&self, kind: FlightKind) -> watch::Receiver<FlightOutcome> {
        let (tx, rx) = watch::channel(None);
        let manager = self.clone();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = match kind {
                FlightKind::Acquire => manager.acquire(epoch).await,
                FlightKind::Generate => manager.generate(epoch).await,
            };
            tx.send_replace(Some(outcome));
        });
        rx
    }

    async fn acquire(&self, epoch: u64) -> Result<String, AuthError> {
        if let Some(value) = self.valid_in_memory().await {
            return Ok(value);
        }
        if let Some(token) = self.load_from_cache().await {
            let value = token.value.clone();
            let mut held = self.inner.token.write().await;
            if self.is_current(epoch) {
                info!(
                    environment = self.inner.environment.as_str(),
                    expires_at = token.expires_at,
                    "access token loaded from cache"
                );
                *held = Some(token);
            } else {
                debug!("cache was cleared during lookup, not adopting the cached token");
            }
            drop(held);
            self.record_hit(CACHE_LAYER).await;
            return Ok(value);
        }
        self.generate(epoch).await
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Read failures degrade to a miss.
    async fn load_from_cache(&self) -> Option<CachedToken> {
        let payload = match self.inner.cache.get(&self.inner.cache_key).await {
            Ok(payload) => payload?,
            Err(err) => {
                warn!("cache read failed, falling back to token endpoint: {}", err);
                get_metrics().await.cache_failures.with_label_values(&["get"]).inc();
                return None;
            }
        };
        let token: CachedToken = match serde_json::from_value(payload) {
            Ok(token) => token,
            Err(err) => {
                warn!("cached access token is unreadable: {}", err);
                return None;
            }
        };
        Some(token).filter(|token| token.is_valid(self.inner.clock.now()))
    }

    async fn generate(&self, epoch: u64) -> Result<String, AuthError> {
        let seen = self.inner.issued.load(Ordering::SeqCst);
        let _generation = self.inner.generation.lock().await;

        // another flight generated while we queued for the endpoint
        if self.inner.issued.load(Ordering::SeqCst) != seen {
            if let Some(value) = self.valid_in_memory().await {
                debug!("reusing access token generated by a concurrent request");
                return Ok(value);
            }
        }

        let metrics = get_metrics().await;
        let environment = self.inner.environment.as_str();
        metrics.token_requests.with_label_values(&[environment]).inc();

        info!(environment, "generating access token");
        let start = Instant::now();
        let result = self.request_token().await;
        metrics
            .token_request_duration
            .with_label_values(&[environment])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok((value, expires_in)) => {
                self.store(&value, expires_in, epoch).await;
                info!(environment, expires_in, "access token generated");
                Ok(value)
            }
            Err(err) => {
                error!(environment, "failed to generate access token: {}", err);
                metrics
                    .token_failures
                    .with_label_values(&[environment, err.reason()])
                    .inc();
                self.drop_if_stale().await;
                Err(err)
            }
        }
    }

    async fn request_token(&self) -> Result<(String, i64), AuthError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.inner.basic_auth.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self.inner.transport.get(&self.inner.token_url, &headers).await?;
        if !response.is_success() {
            return Err(AuthError::Rejected {
                status: response.status.as_u16(),
                message: response.error_message(),
            });
        }
        parse_token_response(&response)
    }

    /// Memory and cache are written under the token lock, so `clear_cache`
    /// sees either both or neither.
    async fn store(&self, value: &str, expires_in: i64, epoch: u64) {
        let lifetime = expires_in - SAFETY_MARGIN_SECS;
        let token = CachedToken::new(value.to_owned(), self.inner.clock.now() + lifetime);

        let mut held = self.inner.token.write().await;
        if !self.is_current(epoch) {
            debug!("cache was cleared during generation, not storing the new token");
            return;
        }
        *held = Some(token.clone());
        self.inner.issued.fetch_add(1, Ordering::SeqCst);

        let metrics = get_metrics().await;
        metrics
            .token_expiry_unix
            .with_label_values(&[self.inner.environment.as_str()])
            .set(token.expires_at);

        if lifetime <= 0 {
            warn!(expires_in, "token lifetime is inside the safety margin, not persisting it");
            return;
        }
        self.persist(&token, lifetime as u64).await;
    }

    /// Write failures are logged; the in-memory token stays usable.
    async fn persist(&self, token: &CachedToken, ttl_seconds: u64) {
        let payload = match serde_json::to_value(token) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode access token for the cache: {}", err);
                return;
            }
        };
        if let Err(err) = self.inner.cache.set(&self.inner.cache_key, payload, ttl_seconds).await {
            error!("failed to persist access token: {}", err);
            get_metrics().await.cache_failures.with_label_values(&["set"]).inc();
        }
    }

    async fn drop_if_stale(&self) {
        let now = self.inner.clock.now();
        let mut token = self.inner.token.write().await;
        if token.as_ref().is_some_and(|t| !t.is_valid(now)) {
            token.take();
        }
    }

    async fn record_hit(&self, layer: &str) {
        get_metrics()
            .await
            .token_hits
            .with_label_values(&[self.inner.environment.as_str(), layer])
            .inc();
    }
}

enum Joined {
    Ready(String),
    Wait(watch::Receiver<FlightOutcome>),
}

async fn wait_for_outcome(mut rx: watch::Receiver<FlightOutcome>) -> Result<String, AuthError> {
    let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or(Err(AuthError::FlightAborted))
}

fn parse_token_response(response: &HttpResponse) -> Result<(String, i64), AuthError> {
    let body: TokenResponse = response
        .json()
        .map_err(|e| AuthError::MalformedResponse(format!("invalid token payload: {}", e)))?;

    let token = body
        .access_token
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::MalformedResponse("missing 'access_token'".to_owned()))?;
    if HeaderValue::from_str(&token).is_err() {
        return Err(AuthError::MalformedResponse(
            "'access_token' contains characters not allowed in a header".to_owned(),
        ));
    }

    let expires_in = match body.expires_in {
        None => DEFAULT_EXPIRES_IN_SECS,
        Some(ExpiresIn::Seconds(secs)) => secs,
        Some(ExpiresIn::Text(text)) => text.trim().parse::<i64>().map_err(|_| {
            AuthError::MalformedResponse(format!("'expires_in' is not a number: '{}'", text))
        })?,
    };
    if expires_in < 0 {
        return Err(AuthError::MalformedResponse(format!(
            "'expires_in' is negative: {}",
            expires_in
        )));
    }
    Ok((token, expires_in))
}

/// Wires a [`TokenManager`] from config plus optional injected parts.
pub struct TokenManagerBuilder {
    config: SdkConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    cache: Option<Arc<dyn Cache>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TokenManagerBuilder {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            transport: None,
            cache: None,
            clock: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<TokenManager> {
        validate_sdk_config(&self.config)
            .map_err(|errors| anyhow!("invalid config: {}", errors.join("; ")))?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.http.timeout())?),
        };
        let cache = match self.cache {
            Some(cache) => cache,
            None => default_cache(&config.cache, clock.clone())?,
        };

        let credentials = format!(
            "{}:{}",
            config.credentials.consumer_key, config.credentials.consumer_secret
        );
        let mut basic_auth = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials)))?;
        basic_auth.set_sensitive(true);

        let cache_key = TokenManager::cache_key_for(&config.credentials.consumer_key, config.environment);
        let token_url = format!("{}?{}", config.oauth_url(), GRANT_TYPE_QUERY);
        debug!("token manager for '{}' uses cache key '{}'", token_url, cache_key);

        Ok(TokenManager {
            inner: Arc::new(Inner {
                environment: config.environment,
                token_url,
                basic_auth,
                cache_key,
                transport,
                cache,
                clock,
                token: RwLock::new(None),
                flight: Mutex::new(None),
                generation: Mutex::new(()),
                issued: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        })
    }
}

fn default_cache(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn Cache>> {
    let cache: Arc<dyn Cache> = match config.kind {
        CacheKind::File => {
            let dir = config.dir.clone().unwrap_or_else(FileCache::default_dir);
            Arc::new(FileCache::new(dir, clock)?)
        }
        CacheKind::Memory => Arc::new(MemoryCache::new(clock)),
    };
    Ok(cache)
}
