use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::rewrite::Rewriter;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Document store (shared across requests)
    pub store: Arc<Store>,

    /// Compiled URL rewrite rules
    pub rewriter: Arc<Rewriter>,

    /// Prometheus exposition handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state, compiling the configured rewrite rules.
    pub fn new(
        config: ServerConfig,
        store: Store,
        metrics: Option<PrometheusHandle>,
    ) -> ServerResult<Self> {
        let rewriter =
            Rewriter::from_rules(&config.rewrites).map_err(|err| ServerError::Config(err.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            rewriter: Arc::new(rewriter),
            metrics,
        })
    }
}
