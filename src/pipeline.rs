//! The request pipeline.
//!
//! A single upload moves through
//! `Received → Authenticated → RateChecked → Validated → IdAssigned →
//! Processed → Persisted → Responded`. Gate failures end it as rejected;
//! remover or storage failures end it as failed. There are no back-edges.
//!
//! [`Pipeline::admit`] covers the gate half and is cheap, so transports call
//! it before reading request bodies. The `process_*` and [`Pipeline::fetch`]
//! calls cover the rest and are blocking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ingest::{SourceFormat, Upload, ValidatedImage, normalize_filename};
use remover::Remover;
use serde::Serialize;
use store::{ArtifactId, ArtifactKind, ArtifactStore};
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::error::PipelineError;
use crate::gate::{CallerContext, GateChain};
use crate::metrics::{MetricsSpan, PipelineMetrics};

/// Result of a successful single-image run.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub id: ArtifactId,
    /// The stored output, PNG encoded.
    pub png: Bytes,
    pub source_format: SourceFormat,
    /// Filename after normalization.
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Time spent inside the remover.
    pub removal_elapsed: Duration,
}

impl ProcessedImage {
    /// Suggested download name.
    pub fn download_name(&self) -> String {
        download_name(&self.id)
    }
}

/// `no_bg_<id>.png`
pub fn download_name(id: &ArtifactId) -> String {
    format!("no_bg_{id}.png")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    /// At least one file failed. Also used when every file failed.
    PartialSuccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub file_id: ArtifactId,
    pub original_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub original_name: String,
    pub error: String,
}

/// Per-file outcomes of a batch, each list in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub message: String,
    pub processed_count: usize,
    pub failed_count: usize,
    pub files: Vec<BatchItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<BatchFailure>,
}

impl BatchReport {
    fn from_outcomes(files: Vec<BatchItem>, failed_files: Vec<BatchFailure>) -> Self {
        let status = if failed_files.is_empty() {
            BatchStatus::Success
        } else {
            BatchStatus::PartialSuccess
        };
        let message = if failed_files.is_empty() {
            format!("{} images processed", files.len())
        } else {
            format!(
                "{} images processed, {} failed",
                files.len(),
                failed_files.len()
            )
        };
        Self {
            status,
            message,
            processed_count: files.len(),
            failed_count: failed_files.len(),
            files,
            failed_files,
        }
    }
}

/// A stored output read back by id.
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub id: ArtifactId,
    pub bytes: Bytes,
    pub extension: String,
    pub age: Duration,
}

/// Explicitly constructed service state: configuration plus the injected
/// store, remover, gates and metrics observer.
pub struct Pipeline {
    config: RelayConfig,
    store: Arc<dyn ArtifactStore>,
    remover: Arc<dyn Remover>,
    gates: GateChain,
    metrics: Option<Arc<dyn PipelineMetrics>>,
}

impl Pipeline {
    /// A pipeline with no gates and no metrics.
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn ArtifactStore>,
        remover: Arc<dyn Remover>,
    ) -> Self {
        Self {
            config,
            store,
            remover,
            gates: GateChain::new(),
            metrics: None,
        }
    }

    pub fn with_gates(mut self, gates: GateChain) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn remover_name(&self) -> &'static str {
        self.remover.name()
    }

    /// Runs the gate chain for one request.
    pub fn admit(&self, ctx: &CallerContext) -> Result<(), PipelineError> {
        self.gates.run(ctx).inspect_err(|err| {
            if let Some(metrics) = &self.metrics {
                metrics.record_gate_rejection(err.kind());
            }
        })
    }

    /// Storage readiness, for health probes.
    pub fn check_ready(&self) -> Result<(), PipelineError> {
        self.store.check_ready().map_err(PipelineError::from)
    }

    fn validate(&self, upload: &Upload) -> Result<ValidatedImage, PipelineError> {
        let span = MetricsSpan::start(self.metrics.as_ref());
        let result = ingest::validate(upload, &self.config.ingest);
        if let Some(span) = span {
            span.record_validation(result.as_ref().map(|_| ()));
        }
        Ok(result?)
    }

    /// Validates, processes and persists one image.
    ///
    /// Nothing is stored unless the remover succeeds. The input is written
    /// before the output, so a failure in between leaves an input with no
    /// output, which [`Pipeline::fetch`] reports as not found.
    pub fn process_single(&self, upload: &Upload) -> Result<ProcessedImage, PipelineError> {
        let result = self.process_single_inner(upload);
        if let Some(metrics) = &self.metrics {
            metrics.record_image(result.is_ok());
        }
        result
    }

    fn process_single_inner(&self, upload: &Upload) -> Result<ProcessedImage, PipelineError> {
        let validated = self.validate(upload)?;
        let id = ArtifactId::generate();

        let started = Instant::now();
        let span = MetricsSpan::start(self.metrics.as_ref());
        let removed = self.remover.remove(&validated.image);
        let removal_elapsed = started.elapsed();
        if let Some(span) = span {
            span.record_removal(self.remover.name(), removed.as_ref().map(|_| ()));
        }
        let removed = removed.inspect_err(|err| {
            warn!(
                id = %id,
                remover = self.remover.name(),
                error = %err,
                "remove_failure"
            );
        })?;

        let png = ingest::encode_png(&removed)?;

        self.store.put(
            &id,
            ArtifactKind::Input,
            validated.format.extension(),
            &validated.original,
        )?;
        self.store.put(&id, ArtifactKind::Output, "png", &png)?;

        info!(
            id = %id,
            format = validated.format.name(),
            width = validated.width,
            height = validated.height,
            elapsed_ms = removal_elapsed.as_millis() as u64,
            "image_processed"
        );

        Ok(ProcessedImage {
            id,
            png: Bytes::from(png),
            source_format: validated.format,
            filename: validated.filename,
            width: validated.width,
            height: validated.height,
            removal_elapsed,
        })
    }

    /// Rejects an empty batch or one longer than `max_batch_files`.
    pub fn check_batch_size(&self, count: usize) -> Result<(), PipelineError> {
        if count == 0 {
            return Err(PipelineError::NoFiles);
        }
        let max = self.config.max_batch_files;
        if count > max {
            return Err(PipelineError::BatchTooLarge { count, max });
        }
        Ok(())
    }

    /// Processes each upload in order. One file failing never stops the rest.
    ///
    /// An empty list or one longer than `max_batch_files` is rejected before
    /// any file is looked at.
    pub fn process_batch(&self, uploads: &[Upload]) -> Result<BatchReport, PipelineError> {
        self.check_batch_size(uploads.len())?;

        let mut files = Vec::with_capacity(uploads.len());
        let mut failed_files = Vec::new();
        for upload in uploads {
            match self.process_single(upload) {
                Ok(processed) => files.push(BatchItem {
                    file_id: processed.id,
                    original_name: processed.filename,
                }),
                Err(err) => {
                    warn!(
                        filename = %upload.filename,
                        reason = err.reason_code(),
                        "batch_item_failed"
                    );
                    failed_files.push(BatchFailure {
                        original_name: display_name(&upload.filename),
                        error: err.to_string(),
                    });
                }
            }
        }

        let report = BatchReport::from_outcomes(files, failed_files);
        info!(
            processed = report.processed_count,
            failed = report.failed_count,
            "batch_processed"
        );
        Ok(report)
    }

    /// Looks up a processed image by its raw, caller-supplied id.
    ///
    /// The id is syntax-checked before the store is touched.
    pub fn fetch(&self, raw_id: &str) -> Result<FetchedArtifact, PipelineError> {
        let id = ArtifactId::parse(raw_id)?;
        let artifact = self
            .store
            .get(&id, ArtifactKind::Output)?
            .ok_or(PipelineError::NotFound)?;

        let age = artifact.age();
        if age > self.config.stale_after() {
            warn!(
                id = %id,
                age_secs = age.as_secs(),
                threshold_secs = self.config.stale_after_secs,
                "stale_artifact"
            );
        }

        Ok(FetchedArtifact {
            id,
            bytes: artifact.bytes,
            extension: artifact.extension,
            age,
        })
    }

    /// Gates, then [`Pipeline::process_single`].
    pub fn handle_single(
        &self,
        ctx: &CallerContext,
        upload: &Upload,
    ) -> Result<ProcessedImage, PipelineError> {
        self.admit(ctx)?;
        self.process_single(upload)
    }

    /// Gates, then [`Pipeline::process_batch`].
    pub fn handle_batch(
        &self,
        ctx: &CallerContext,
        uploads: &[Upload],
    ) -> Result<BatchReport, PipelineError> {
        self.admit(ctx)?;
        self.process_batch(uploads)
    }

    /// Gates, then [`Pipeline::fetch`].
    pub fn handle_download(
        &self,
        ctx: &CallerContext,
        raw_id: &str,
    ) -> Result<FetchedArtifact, PipelineError> {
        self.admit(ctx)?;
        self.fetch(raw_id)
    }
}

/// Name to report for a file that failed, preferring the normalized form.
fn display_name(raw: &str) -> String {
    normalize_filename(raw).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::CountingMetrics;
    use crate::rate_limit::{FixedWindowLimiter, RateClass, RateLimits};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use remover::{StubBehavior, StubRemover};
    use std::collections::HashSet;
    use std::io::Cursor;
    use store::InMemoryArtifactStore;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 80, 120])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline_with(remover: Arc<StubRemover>) -> (Pipeline, Arc<InMemoryArtifactStore>) {
        let store = Arc::new(InMemoryArtifactStore::new());
        let pipeline = Pipeline::new(RelayConfig::default(), store.clone(), remover);
        (pipeline, store)
    }

    #[test]
    fn single_stores_input_and_output() {
        let (pipeline, store) = pipeline_with(Arc::new(StubRemover::identity()));
        let upload = Upload::new("photo.png", png(8, 6));

        let processed = pipeline.process_single(&upload).unwrap();
        assert_eq!(processed.source_format, SourceFormat::Png);
        assert_eq!((processed.width, processed.height), (8, 6));
        assert_eq!(store.len(), 2);

        let output = store
            .get(&processed.id, ArtifactKind::Output)
            .unwrap()
            .unwrap();
        assert_eq!(output.bytes, processed.png);
        let input = store
            .get(&processed.id, ArtifactKind::Input)
            .unwrap()
            .unwrap();
        assert_eq!(input.bytes, upload.bytes);
    }

    #[test]
    fn output_is_png_with_alpha() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let processed = pipeline
            .process_single(&Upload::new("photo.png", png(4, 4)))
            .unwrap();
        let decoded = image::load_from_memory_with_format(&processed.png, ImageFormat::Png).unwrap();
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn invalid_upload_never_reaches_remover() {
        let remover = Arc::new(StubRemover::identity());
        let (pipeline, store) = pipeline_with(remover.clone());

        let err = pipeline
            .process_single(&Upload::new("notes.txt", png(4, 4)))
            .unwrap_err();
        assert_eq!(err.reason_code(), "unsupported_extension");
        assert_eq!(remover.calls(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn remover_failure_stores_nothing() {
        let (pipeline, store) = pipeline_with(Arc::new(StubRemover::failing("model crashed")));
        let err = pipeline
            .process_single(&Upload::new("a.png", png(4, 4)))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
        assert!(err.to_string().contains("model crashed"));
        assert!(store.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let ids: HashSet<String> = (0..25)
            .map(|_| {
                pipeline
                    .process_single(&Upload::new("a.png", png(2, 2)))
                    .unwrap()
                    .id
                    .to_string()
            })
            .collect();
        assert_eq!(ids.len(), 25);
    }

    #[test]
    fn batch_all_valid_is_success() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let uploads: Vec<_> = (0..10)
            .map(|i| Upload::new(format!("img{i}.png"), png(3, 3)))
            .collect();

        let report = pipeline.process_batch(&uploads).unwrap();
        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.processed_count, 10);
        assert!(report.failed_files.is_empty());
        assert_eq!(report.message, "10 images processed");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json.get("failed_files").is_none());
    }

    #[test]
    fn batch_over_limit_processes_nothing() {
        let remover = Arc::new(StubRemover::identity());
        let (pipeline, store) = pipeline_with(remover.clone());
        let uploads: Vec<_> = (0..12)
            .map(|i| Upload::new(format!("img{i}.png"), png(3, 3)))
            .collect();

        let err = pipeline.process_batch(&uploads).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BatchTooLarge { count: 12, max: 10 }
        ));
        assert_eq!(remover.calls(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn batch_isolates_failures_and_keeps_order() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let mut uploads: Vec<_> = (1..=5)
            .map(|i| Upload::new(format!("img{i}.png"), png(3, 3)))
            .collect();
        uploads[2] = Upload::new("img3.png", b"plain text, not pixels".to_vec());

        let report = pipeline.process_batch(&uploads).unwrap();
        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert_eq!(report.processed_count, 4);
        assert_eq!(report.failed_count, 1);
        let names: Vec<_> = report
            .files
            .iter()
            .map(|f| f.original_name.as_str())
            .collect();
        assert_eq!(names, vec!["img1.png", "img2.png", "img4.png", "img5.png"]);
        assert_eq!(report.failed_files[0].original_name, "img3.png");
    }

    #[test]
    fn batch_all_failed_is_still_partial_success() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::failing("down")));
        let uploads = vec![Upload::new("a.png", png(2, 2)), Upload::new("b.png", png(2, 2))];
        let report = pipeline.process_batch(&uploads).unwrap();
        assert_eq!(report.status, BatchStatus::PartialSuccess);
        assert!(report.files.is_empty());
        assert_eq!(report.failed_count, 2);
    }

    #[test]
    fn batch_remover_failure_on_one_file() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::new(StubBehavior::FailOnWidth(7))));
        let uploads = vec![
            Upload::new("a.png", png(2, 2)),
            Upload::new("b.png", png(7, 2)),
            Upload::new("c.png", png(3, 2)),
        ];
        let report = pipeline.process_batch(&uploads).unwrap();
        assert_eq!(report.processed_count, 2);
        assert_eq!(report.failed_files[0].original_name, "b.png");
        assert!(report.failed_files[0].error.contains("width 7"));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        assert!(matches!(
            pipeline.process_batch(&[]),
            Err(PipelineError::NoFiles)
        ));
    }

    #[test]
    fn fetch_round_trips_output() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let processed = pipeline
            .process_single(&Upload::new("a.png", png(5, 5)))
            .unwrap();

        let fetched = pipeline.fetch(processed.id.as_str()).unwrap();
        assert_eq!(fetched.bytes, processed.png);
        assert_eq!(fetched.extension, "png");
    }

    #[test]
    fn fetch_rejects_malformed_ids() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        for raw in ["../etc/passwd", "a/b", "..", "id with space", ""] {
            let err = pipeline.fetch(raw).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidId(_)), "{raw}");
        }
    }

    #[test]
    fn fetch_unknown_or_input_only_is_not_found() {
        let (pipeline, store) = pipeline_with(Arc::new(StubRemover::identity()));
        assert!(matches!(
            pipeline.fetch("0000-unknown"),
            Err(PipelineError::NotFound)
        ));

        let id = ArtifactId::generate();
        store.put(&id, ArtifactKind::Input, "png", b"x").unwrap();
        assert!(matches!(
            pipeline.fetch(id.as_str()),
            Err(PipelineError::NotFound)
        ));
    }

    /// Holds a single output written eight days ago.
    struct AgedStore {
        id: ArtifactId,
    }

    impl ArtifactStore for AgedStore {
        fn put(
            &self,
            _id: &ArtifactId,
            _kind: ArtifactKind,
            _extension: &str,
            _bytes: &[u8],
        ) -> Result<(), store::StoreError> {
            Ok(())
        }

        fn get(
            &self,
            id: &ArtifactId,
            kind: ArtifactKind,
        ) -> Result<Option<store::StoredArtifact>, store::StoreError> {
            if *id != self.id || kind != ArtifactKind::Output {
                return Ok(None);
            }
            Ok(Some(store::StoredArtifact {
                bytes: Bytes::from_static(b"old-png"),
                extension: "png".into(),
                written_at: std::time::SystemTime::now() - Duration::from_secs(8 * 24 * 3600),
            }))
        }
    }

    #[test]
    fn stale_artifact_is_still_served() {
        let id = ArtifactId::generate();
        let store = Arc::new(AgedStore { id: id.clone() });
        let pipeline = Pipeline::new(
            RelayConfig::default(),
            store.clone(),
            Arc::new(StubRemover::identity()),
        );

        let fetched = pipeline.fetch(id.as_str()).expect("stale artifacts are served");
        assert!(fetched.age > pipeline.config().stale_after());
        assert_eq!(fetched.bytes.as_ref(), b"old-png");

        // Nothing was evicted by the lookup.
        assert!(store.get(&id, ArtifactKind::Output).unwrap().is_some());
        assert!(pipeline.fetch(id.as_str()).is_ok());
    }

    #[test]
    fn batch_size_check_runs_without_uploads() {
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        assert!(pipeline.check_batch_size(1).is_ok());
        assert!(pipeline.check_batch_size(10).is_ok());
        assert!(matches!(
            pipeline.check_batch_size(0),
            Err(PipelineError::NoFiles)
        ));
        assert!(matches!(
            pipeline.check_batch_size(11),
            Err(PipelineError::BatchTooLarge { count: 11, max: 10 })
        ));
    }

    #[test]
    fn rate_limited_request_skips_remover() {
        let remover = Arc::new(StubRemover::identity());
        let limiter = Arc::new(FixedWindowLimiter::new(RateLimits {
            remove: 1,
            ..Default::default()
        }));
        let keys = vec!["k-1".to_string()];
        let (pipeline, _store) = pipeline_with(remover.clone());
        let pipeline = pipeline.with_gates(GateChain::standard(&keys, limiter));

        let ctx = CallerContext::new(RateClass::Remove).with_api_key("k-1");
        let upload = Upload::new("a.png", png(2, 2));
        pipeline.handle_single(&ctx, &upload).unwrap();
        assert_eq!(remover.calls(), 1);

        let err = pipeline.handle_single(&ctx, &upload).unwrap_err();
        assert!(matches!(err, PipelineError::RateLimited { .. }));
        assert_eq!(remover.calls(), 1);
    }

    #[test]
    fn metrics_observe_each_stage() {
        let metrics = Arc::new(CountingMetrics::default());
        let (pipeline, _store) = pipeline_with(Arc::new(StubRemover::identity()));
        let keys = vec!["k".to_string()];
        let limiter = Arc::new(FixedWindowLimiter::new(RateLimits::default()));
        let pipeline = pipeline
            .with_gates(GateChain::standard(&keys, limiter))
            .with_metrics(metrics.clone());

        pipeline
            .handle_single(
                &CallerContext::new(RateClass::Remove).with_api_key("k"),
                &Upload::new("a.png", png(2, 2)),
            )
            .unwrap();
        let _ = pipeline.handle_single(
            &CallerContext::new(RateClass::Remove),
            &Upload::new("a.png", png(2, 2)),
        );
        let _ = pipeline.process_single(&Upload::new("a.gif", b"nope".to_vec()));

        assert_eq!(
            metrics.snapshot(),
            vec![
                "validate_ok",
                "remove_ok",
                "image_ok",
                "gate_auth_required",
                "validate_err",
                "image_err",
            ]
        );
    }
}
