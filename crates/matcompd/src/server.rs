//! HTTP server for matcompd

use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use matcomp_common::{ComparisonAggregator, Config, HistoryStore, HttpPredictionSource, PredictionSource};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub source: Arc<dyn PredictionSource>,
    pub history: Arc<HistoryStore>,
    pub aggregator: ComparisonAggregator,
    /// Tolerance applied when a request leaves it out
    pub default_tolerance: f64,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        source: Arc<dyn PredictionSource>,
        history: HistoryStore,
        aggregator: ComparisonAggregator,
        default_tolerance: f64,
    ) -> Self {
        Self {
            source,
            history: Arc::new(history),
            aggregator,
            default_tolerance,
            start_time: Instant::now(),
        }
    }

    /// Build state from configuration: HTTP backend and on-disk history.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpPredictionSource::new(&config.backend.base_url, config.backend.timeout_secs);
        info!("  Prediction backend: {}", source.base_url());

        let db_path = config.history.resolved_path();
        let history = HistoryStore::open(&db_path)
            .with_context(|| format!("Failed to open history at {}", db_path.display()))?;

        Ok(Self::new(
            Arc::new(source),
            history,
            ComparisonAggregator::new(config.comparison.options()),
            config.comparison.default_tolerance,
        ))
    }
}

/// Full router with every route group and the trace layer.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::compare_routes())
        .merge(routes::history_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until ctrl-c
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("  Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down gracefully");
}
