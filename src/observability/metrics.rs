use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::{Arc, OnceLock};
use tracing::info;

// Declare the static OnceLock to hold the Metrics.
static METRICS_INSTANCE: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Lazily initializes and gets a reference to the static `Metrics`.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE.get_or_init(|| {
        info!("Initializing Metrics ...");
        Metrics::new()
    })
}

pub const OUTCOME_HIT: &str = "hit";
pub const OUTCOME_MISS: &str = "miss";
pub const KIND_REQUEST: &str = "request";
pub const KIND_REFRESH: &str = "refresh";
pub const RESULT_OK: &str = "ok";
pub const RESULT_ERROR: &str = "error";

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Store metrics
    pub token_requests: IntCounterVec,
    pub token_acquisitions: IntCounterVec,
    pub token_acquisition_duration: HistogramVec,
    pub token_request_timeouts: IntCounterVec,
    pub cached_tokens: IntGaugeVec,
    pub worker_restarts: IntCounterVec,

    // Runtime
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenstore".into()), None)
            .unwrap_or_else(|_| Registry::new());

        let metrics: Arc<Metrics> = Arc::new(Self {
            token_requests: IntCounterVec::new(Opts::new("token_requests_total", "Token requests by cache outcome"), &["provider", "outcome"]).unwrap(),
            token_acquisitions: IntCounterVec::new(Opts::new("token_acquisitions_total", "Provider calls by kind and result"), &["provider", "kind", "result"]).unwrap(),
            token_acquisition_duration: HistogramVec::new(HistogramOpts::new("token_acquisition_duration_seconds", "Provider call duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["provider"]).unwrap(),
            token_request_timeouts: IntCounterVec::new(Opts::new("token_request_timeouts_total", "Requests that gave up waiting"), &["provider"]).unwrap(),
            cached_tokens: IntGaugeVec::new(Opts::new("cached_tokens", "Cached tokens per provider"), &["provider"]).unwrap(),
            worker_restarts: IntCounterVec::new(Opts::new("worker_restarts_total", "Provider worker crashes followed by a cold restart"), &["provider"]).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_requests.clone())).unwrap();
        reg.register(Box::new(metrics.token_acquisitions.clone())).unwrap();
        reg.register(Box::new(metrics.token_acquisition_duration.clone())).unwrap();
        reg.register(Box::new(metrics.token_request_timeouts.clone())).unwrap();
        reg.register(Box::new(metrics.cached_tokens.clone())).unwrap();
        reg.register(Box::new(metrics.worker_restarts.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
