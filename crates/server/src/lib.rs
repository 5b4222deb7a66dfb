//! bgrelay server: HTTP front end for background removal
//!
//! Accepts image uploads, strips their backgrounds through the configured
//! remover, stores the result, and serves it back for download.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Endpoints
//!
//! ## Public (no authentication)
//!
//! - `GET /` - upload page
//! - `GET /health` - liveness probe
//! - `GET /ready` - readiness probe (storage writable)
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Gated (API key plus per-class rate limit)
//!
//! - `POST /remove-background` - one image in multipart field `file`, PNG back
//! - `POST /batch-remove` - up to `relay.max_batch_files` images in `files[]`
//! - `GET /download/{id}` - a previously processed image
//!
//! The API key is read from `X-API-Key`, `Authorization: Bearer <key>`, or the
//! `api_key` query parameter.

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, ServerConfig, DEMO_API_KEY};
pub use error::{ErrorResponse, ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
