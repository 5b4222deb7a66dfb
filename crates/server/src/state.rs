use crate::config::ServerConfig;
use crate::metrics::{prometheus_handle, PrometheusMetrics};
use bgrelay::{FixedWindowLimiter, GateChain, Pipeline};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Gates, validator, store and remover
    pub pipeline: Arc<Pipeline>,

    /// Kept so the server can purge expired rate-limit windows
    pub limiter: Arc<FixedWindowLimiter>,

    /// Bounds concurrent removals; each permit is one model run
    pub removal_slots: Arc<Semaphore>,

    /// Renders `/metrics`; `None` when metrics are disabled
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    /// Builds the pipeline described by `config`: store and remover from
    /// their sections, API key and rate limit gates, Prometheus observer.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store = config.storage.build()?;
        let remover = config.remover.build()?;
        let limiter = Arc::new(FixedWindowLimiter::new(config.relay.rate_limits.clone()));
        let gates = GateChain::standard(&config.api_keys, limiter.clone());

        let mut pipeline = Pipeline::new(config.relay.clone(), Arc::from(store), remover)
            .with_gates(gates);
        let prometheus = if config.metrics_enabled {
            pipeline = pipeline.with_metrics(Arc::new(PrometheusMetrics));
            prometheus_handle()
        } else {
            None
        };

        Ok(Self {
            removal_slots: Arc::new(Semaphore::new(config.max_concurrent_removals)),
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            limiter,
            prometheus,
        })
    }
}
