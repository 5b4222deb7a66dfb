//! Observer hooks for pipeline stages.
//!
//! The pipeline never talks to a metrics backend directly. It reports to an
//! injected [`PipelineMetrics`] and the server decides where numbers go.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ingest::IngestError;
use remover::RemoveError;

use crate::error::ErrorKind;

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    /// A gate turned a request away.
    fn record_gate_rejection(&self, gate: ErrorKind);
    fn record_validation(&self, latency: Duration, result: Result<(), &IngestError>);
    fn record_removal(&self, backend: &'static str, latency: Duration, result: Result<(), &RemoveError>);
    /// Outcome of one whole image: processed and persisted, or not.
    fn record_image(&self, ok: bool);
}

/// Times one stage and reports it when finished. Dropped without reporting
/// when no observer is installed.
pub(crate) struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start(recorder: Option<&Arc<dyn PipelineMetrics>>) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: recorder.clone(),
            start: Instant::now(),
        })
    }

    pub(crate) fn record_validation(self, result: Result<(), &IngestError>) {
        self.recorder
            .record_validation(self.start.elapsed(), result);
    }

    pub(crate) fn record_removal(self, backend: &'static str, result: Result<(), &RemoveError>) {
        self.recorder
            .record_removal(backend, self.start.elapsed(), result);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::RwLock;

    /// Records event labels in order.
    #[derive(Default)]
    pub(crate) struct CountingMetrics {
        events: RwLock<Vec<String>>,
    }

    impl CountingMetrics {
        pub(crate) fn snapshot(&self) -> Vec<String> {
            self.events.read().unwrap().clone()
        }

        fn push(&self, label: impl Into<String>) {
            self.events.write().unwrap().push(label.into());
        }
    }

    impl PipelineMetrics for CountingMetrics {
        fn record_gate_rejection(&self, gate: ErrorKind) {
            self.push(format!("gate_{gate}"));
        }

        fn record_validation(&self, _latency: Duration, result: Result<(), &IngestError>) {
            self.push(if result.is_ok() {
                "validate_ok"
            } else {
                "validate_err"
            });
        }

        fn record_removal(
            &self,
            _backend: &'static str,
            _latency: Duration,
            result: Result<(), &RemoveError>,
        ) {
            self.push(if result.is_ok() {
                "remove_ok"
            } else {
                "remove_err"
            });
        }

        fn record_image(&self, ok: bool) {
            self.push(if ok { "image_ok" } else { "image_err" });
        }
    }
}
