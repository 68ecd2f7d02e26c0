use crate::state::{Overview, ServerDetail, ServerStatus, StatusBoard};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reconciler::keys::namespace_prefix;
use reconciler::{StoreAdapter, StoreError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub board: StatusBoard,
    pub store: Arc<dyn StoreAdapter>,
    /// Already redacted.
    pub config: Arc<reconciler::Config>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unknown server: {0}")]
    UnknownServer(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownServer(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerResponse {
    status: ServerStatus,
    #[serde(flatten)]
    detail: ServerDetail,
}

#[derive(Serialize)]
struct KeysResponse {
    count: usize,
    keys: Vec<String>,
}

#[derive(Serialize)]
struct FlushResponse {
    deleted: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/servers", get(servers))
        .route("/api/v1/servers/{name}", get(server))
        .route("/api/v1/servers/{name}/refresh", post(refresh))
        .route("/api/v1/config", get(config))
        .route("/api/v1/store/keys", get(store_keys))
        .route("/api/v1/store/flush", post(store_flush))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Overview> {
    Json(state.board.overview())
}

async fn servers(State(state): State<AppState>) -> Json<Vec<ServerStatus>> {
    Json(state.board.servers())
}

async fn server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServerResponse>, ApiError> {
    let (Some(instance), Some(status)) = (state.board.instance(&name), state.board.get(&name))
    else {
        return Err(ApiError::UnknownServer(name));
    };

    let detail = ServerDetail::fetch(instance).await;
    Ok(Json(ServerResponse { status, detail }))
}

async fn refresh(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServerStatus>, ApiError> {
    tracing::info!(server = %name, "Status refresh requested");
    state
        .board
        .refresh_one(&name)
        .await
        .map(Json)
        .ok_or(ApiError::UnknownServer(name))
}

async fn config(State(state): State<AppState>) -> Json<reconciler::Config> {
    Json(state.config.as_ref().clone())
}

async fn store_keys(State(state): State<AppState>) -> Result<Json<KeysResponse>, ApiError> {
    let keys = state.store.keys(&namespace_prefix()).await?;
    Ok(Json(KeysResponse {
        count: keys.len(),
        keys,
    }))
}

/// Removes every key under the namespace. Keys outside it are left alone.
async fn store_flush(State(state): State<AppState>) -> Result<Json<FlushResponse>, ApiError> {
    let keys: BTreeSet<String> = state
        .store
        .keys(&namespace_prefix())
        .await?
        .into_iter()
        .collect();
    state.store.delete_keys(&keys).await?;

    tracing::warn!(count = keys.len(), "Flushed store namespace");
    Ok(Json(FlushResponse {
        deleted: keys.len(),
    }))
}
