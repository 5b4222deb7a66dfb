//! Prometheus wiring for the pipeline observer and the HTTP layer.

use std::time::Duration;

use bgrelay::{ErrorKind, IngestError, PipelineMetrics, RemoveError};
use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

/// Installs the Prometheus recorder on first call and returns its handle.
///
/// The recorder is process-global, so every router built in this process
/// shares it. `None` means another recorder was installed first.
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "prometheus recorder not installed");
                None
            }
        })
        .clone()
}

/// Forwards pipeline events to the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl PipelineMetrics for PrometheusMetrics {
    fn record_gate_rejection(&self, gate: ErrorKind) {
        counter!("bgrelay_gate_rejections_total", "reason" => gate.as_str()).increment(1);
    }

    fn record_validation(&self, latency: Duration, result: Result<(), &IngestError>) {
        let outcome = match result {
            Ok(()) => "accepted",
            Err(err) => err.reason_code(),
        };
        counter!("bgrelay_validations_total", "outcome" => outcome).increment(1);
        histogram!("bgrelay_validation_duration_seconds").record(latency.as_secs_f64());
    }

    fn record_removal(
        &self,
        backend: &'static str,
        latency: Duration,
        result: Result<(), &RemoveError>,
    ) {
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("bgrelay_removals_total", "backend" => backend, "outcome" => outcome)
            .increment(1);
        histogram!("bgrelay_removal_duration_seconds", "backend" => backend)
            .record(latency.as_secs_f64());
    }

    fn record_image(&self, ok: bool) {
        let outcome = if ok { "processed" } else { "failed" };
        counter!("bgrelay_images_total", "outcome" => outcome).increment(1);
    }
}

/// Per-response counter, labelled by status code.
pub fn record_http_response(status: u16) {
    counter!("bgrelay_http_responses_total", "status" => status.to_string()).increment(1);
}
