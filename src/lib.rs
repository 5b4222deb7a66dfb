//! Workspace umbrella crate for bgrelay, a background removal relay.
//!
//! This crate stitches the validator, artifact store and remover into one
//! [`Pipeline`] that the HTTP server (or any other caller) drives. It owns the
//! parts that span stages: the gate chain in front of every protected call,
//! the error taxonomy, and the metrics observer hooks.
//!
//! ```
//! use std::sync::Arc;
//! use bgrelay::{Pipeline, RelayConfig, Upload};
//! use remover::StubRemover;
//! use store::InMemoryArtifactStore;
//!
//! let pipeline = Pipeline::new(
//!     RelayConfig::default(),
//!     Arc::new(InMemoryArtifactStore::new()),
//!     Arc::new(StubRemover::identity()),
//! );
//!
//! let err = pipeline
//!     .process_single(&Upload::new("notes.txt", b"hello".to_vec()))
//!     .unwrap_err();
//! assert_eq!(err.reason_code(), "unsupported_extension");
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;

pub use config::{ConfigError, RelayConfig};
pub use error::{ErrorKind, PipelineError};
pub use gate::{ApiKeyGate, CallerContext, Gate, GateChain, RateLimitGate, key_prefix};
pub use metrics::PipelineMetrics;
pub use pipeline::{
    BatchFailure, BatchItem, BatchReport, BatchStatus, FetchedArtifact, Pipeline, ProcessedImage,
    download_name,
};
pub use rate_limit::{FixedWindowLimiter, RateClass, RateDecision, RateLimiter, RateLimits};

pub use ingest::{IngestConfig, IngestError, SourceFormat, Upload, ValidatedImage};
pub use remover::{RemoveError, Remover, RemoverBackend, RemoverConfig};
pub use store::{ArtifactId, ArtifactKind, ArtifactStore, StoreConfig, StoreError};
