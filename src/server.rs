//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all endpoints
//! - Middleware stack (normalizer, paginator, logging, CORS, timeouts)
//! - Graceful shutdown handling

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::middleware::{log_requests, normalize_request, request_id};
use crate::paginate;
use crate::routes::{self, collections, health, uploads};
use crate::state::AppState;
use crate::store::Store;

/// Build the Axum router with all routes and middleware
///
/// Routes are divided into:
/// - Collection routes: generic CRUD, wrapped by the response paginator
/// - Direct routes: health, metrics, echo, `/db`, record creation, uploads,
///   and the static `/cdn` service - these respond without an envelope
///
/// The request normalizer (rewrites, pagination translation, timestamping)
/// runs before routing for every request.
pub fn build_router(state: AppState) -> Router {
    // CORS layer
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let cdn_path = state.config.cdn_public_path.clone();
    let content_root = state.config.content_root.clone();

    // Collection router responses flow through the paginator
    let collection_routes = Router::new()
        .route("/{collection}", get(collections::list_records))
        .route(
            "/{collection}/{id}",
            get(collections::get_record)
                .put(collections::replace_record)
                .patch(collections::merge_record)
                .delete(collections::delete_record),
        )
        .layer(from_fn_with_state(
            state.clone(),
            paginate::envelope_responses,
        ));

    // Direct routes respond with their bare payloads
    let direct_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/echo", get(routes::echo))
        .route("/db", get(collections::get_db))
        .route("/{collection}", post(collections::create_record))
        .route("/{collection}/uploads", post(uploads::upload_files))
        .nest_service(&cdn_path, ServeDir::new(&content_root));

    // Combine routes
    Router::new()
        .merge(direct_routes)
        .merge(collection_routes)
        .fallback(routes::not_found)
        .layer(from_fn_with_state(state.clone(), normalize_request))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::new(state.config.timeout()))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the jsonmock HTTP server
///
/// Loads the document, builds the router, binds the configured TCP address,
/// and serves until SIGTERM or Ctrl+C. An unreadable document or an
/// unbindable address is fatal: the error propagates out of `main` with a
/// diagnostic and a non-zero exit code.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    // Install the Prometheus recorder before the first request is counted
    let metrics = if config.metrics_enabled {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    // Load the document; a missing or malformed file aborts startup
    let store = Store::load(&config.db_path).await?;
    let collections = store.collections().await;

    let state = AppState::new(config.clone(), store, metrics)?;
    let app = build_router(state);

    let addr = config.socket_addr()?;
    tracing::info!(
        address = %addr,
        document = %config.db_path,
        collections = collections.len(),
        "jsonmock server starting"
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB, CORS: {}",
        config.timeout_secs,
        config.max_body_size_mb,
        config.enable_cors
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
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
