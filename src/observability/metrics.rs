use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

/// Prometheus text exposition of every registered metric.
pub async fn render_metrics() -> Result<String> {
    let metrics = get_metrics().await;
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token endpoint
    pub token_requests: IntCounterVec,
    pub token_failures: IntCounterVec,
    pub token_request_duration: HistogramVec,

    // Token reuse
    pub token_hits: IntCounterVec,
    pub token_expiry_unix: IntGaugeVec,

    // Cache backend
    pub cache_failures: IntCounterVec,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("mpesaauth".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token endpoint calls by environment"), &["environment"]).unwrap(),
            token_failures: IntCounterVec::new(Opts::new("token_failures_total", "Token endpoint failures by reason"), &["environment", "reason"]).unwrap(),
            token_request_duration: HistogramVec::new(HistogramOpts::new("token_request_duration_seconds", "Token endpoint latency seconds").buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]), &["environment"]).unwrap(),

            token_hits: IntCounterVec::new(Opts::new("token_hits_total", "Tokens served without a remote call"), &["environment", "layer"]).unwrap(),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Safety-margined expiry of the current token"), &["environment"]).unwrap(),

            cache_failures: IntCounterVec::new(Opts::new("cache_failures_total", "Cache backend failures by operation"), &["operation"]).unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_requests.clone())).unwrap();
        reg.register(Box::new(metrics.token_failures.clone())).unwrap();
        reg.register(Box::new(metrics.token_request_duration.clone())).unwrap();
        reg.register(Box::new(metrics.token_hits.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();
        reg.register(Box::new(metrics.cache_failures.clone())).unwrap();

        metrics
    }
}
