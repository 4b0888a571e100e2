use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::sources::HttpProvider;
use crate::store::AuthTokenStore;

pub mod tokens;

use tokens::TokensState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub tokens_state: TokensState,
}

impl AppState {
    pub fn new(
        metrics: &Metrics,
        store: Arc<AuthTokenStore>,
        providers: HashMap<String, Arc<HttpProvider>>,
    ) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            tokens_state: TokensState::new(store, providers),
        }
    }
}

pub fn router(settings_config: &SettingsConfig, state: AppState) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(state.tokens_state.router())
        .with_state(state)
}

/// Start one Axum server with the token and metrics routes.
pub async fn start(
    settings_config: &SettingsConfig,
    store: Arc<AuthTokenStore>,
    providers: HashMap<String, Arc<HttpProvider>>,
) -> Result<()> {
    let metrics = get_metrics();
    let state = AppState::new(metrics, store, providers);
    let app = router(settings_config, state);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    info!("listening on {}", listener.local_addr()?);
    metrics.up.set(1);
    axum::serve(listener, app).await?;

    Ok(())
}
