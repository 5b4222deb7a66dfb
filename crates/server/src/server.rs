//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all endpoints
//! - Middleware stack (gates, logging, security headers, compression)
//! - Background upkeep for the rate limiter and metrics recorder
//! - Graceful shutdown handling

use crate::config::ServerConfig;
use crate::middleware::{gate, log_requests, request_id, security_headers};
use crate::routes::{download, health, index_page, method_not_allowed, not_found, remove};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use bgrelay::RateClass;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Build the Axum router with all routes and middleware
///
/// Routes are divided into:
/// - Public routes: /, /health, /ready, /metrics (no auth required)
/// - Gated routes: /remove-background, /batch-remove, /download/{id}, each
///   behind the API key gate and its own rate-limit class
///
/// Middleware stack (outermost first):
/// 1. Security headers
/// 2. HTTP tracing
/// 3. Request logging
/// 4. Request ID tracking
/// 5. CORS
/// 6. Compression
/// 7. Timeout handling
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(index_page))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let gated = |class: RateClass| from_fn_with_state((state.clone(), class), gate);

    let remove_routes = Router::new()
        .route("/remove-background", post(remove::remove_background))
        .route_layer(gated(RateClass::Remove));
    let batch_routes = Router::new()
        .route("/batch-remove", post(remove::batch_remove))
        .route_layer(gated(RateClass::Batch));
    let download_routes = Router::new()
        .route("/download/{*id}", get(download::download))
        .route_layer(gated(RateClass::Download));

    Router::new()
        .merge(public_routes)
        .merge(remove_routes)
        .merge(batch_routes)
        .merge(download_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(security_headers))
        .with_state(state)
}

/// Start the bgrelay HTTP server
///
/// Sets up JSON logging, builds the pipeline from `config`, and serves until
/// SIGTERM or Ctrl+C.
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let addr: SocketAddr = config.socket_addr()?;
    let state = Arc::new(ServerState::new(config.clone())?);
    health::mark_started();
    spawn_upkeep(&state);

    let app = build_router(state);

    tracing::info!(
        addr = %addr,
        api_keys = config.api_keys.len(),
        remover = ?config.remover.backend,
        "starting bgrelay server"
    );
    tracing::info!(
        timeout_secs = config.timeout_secs,
        max_body_mb = config.max_body_size_mb,
        max_batch_files = config.relay.max_batch_files,
        max_concurrent_removals = config.max_concurrent_removals,
        "limits"
    );
    tracing::info!(
        remove = config.relay.rate_limits.remove,
        batch = config.relay.rate_limits.batch,
        download = config.relay.rate_limits.download,
        window_secs = config.relay.rate_limits.window_secs,
        "rate_limits"
    );
    tracing::info!(
        cors = config.enable_cors,
        metrics = config.metrics_enabled,
        "features"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Periodic limiter purge and Prometheus histogram upkeep.
fn spawn_upkeep(state: &Arc<ServerState>) {
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let window = limiter.limits().window().max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(window);
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                tracing::debug!(
                    purged,
                    remaining = limiter.tracked(),
                    "rate_windows_purged"
                );
            }
        }
    });

    if let Some(handle) = state.prometheus.clone() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
            loop {
                ticker.tick().await;
                handle.run_upkeep();
            }
        });
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
