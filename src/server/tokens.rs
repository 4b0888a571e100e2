use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::server::AppState;
use crate::sources::HttpProvider;
use crate::store::AuthTokenStore;

/// Token endpoints backed by the store, one route per configured provider.
#[derive(Clone)]
pub struct TokensState {
    pub store: Arc<AuthTokenStore>,
    pub providers: Arc<HashMap<String, Arc<HttpProvider>>>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub provider: String,
    pub token: String,
    pub ttl: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub extra: BTreeMap<String, Value>,
}

impl TokensState {
    pub fn new(store: Arc<AuthTokenStore>, providers: HashMap<String, Arc<HttpProvider>>) -> Self {
        Self {
            store,
            providers: Arc::new(providers),
        }
    }

    pub fn router(&self) -> Router<AppState> {
        Router::new().route("/tokens/{provider}", get(get_token).delete(release_token))
    }
}

async fn get_token(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let tokens = &state.tokens_state;
    let Some(provider) = tokens.providers.get(&name) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown provider '{}'", name));
    };
    let credentials = match provider.credentials() {
        Ok(credentials) => credentials,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)),
    };

    match tokens.store.request(provider, credentials).await {
        Ok(token) => Json(TokenResponse {
            provider: token.provider().to_owned(),
            token: token.token().to_owned(),
            ttl: token.ttl(),
            timestamp: token.timestamp(),
            extra: token.extra().clone(),
        })
        .into_response(),
        Err(err) => {
            warn!("provider '{}': {}", name, err);
            error_response(status_for(&err), err.to_string())
        }
    }
}

async fn release_token(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let tokens = &state.tokens_state;
    let Some(provider) = tokens.providers.get(&name) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown provider '{}'", name));
    };
    let credentials = match provider.credentials() {
        Ok(credentials) => credentials,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err)),
    };

    match tokens.store.release(provider, credentials).await {
        Ok(()) => {
            info!("provider '{}': released over http", name);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(status_for(&err), err.to_string()),
    }
}

pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::AcquisitionFailed(_) | StoreError::UnknownAcquisitionResult(_) => StatusCode::BAD_GATEWAY,
        StoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        StoreError::ProviderStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
