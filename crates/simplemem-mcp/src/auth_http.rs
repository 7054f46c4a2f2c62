//! `/api/auth/*`, `/api/health`, `/api/server/info` — the plain REST
//! surface alongside `/mcp` (spec §6 External Interfaces).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::protocol::http::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    provider_api_key: String,
    #[serde(default = "default_embedding_dim")]
    embedding_dim: usize,
}

fn default_embedding_dim() -> usize {
    1536
}

pub async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> Response {
    match state.shared.auth.register(&req.provider_api_key, req.embedding_dim) {
        Ok((user_id, token)) => (StatusCode::OK, Json(json!({ "success": true, "user_id": user_id, "token": token }))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "error": e.to_string() }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    token: String,
}

pub async fn verify(State(state): State<Arc<AppState>>, Query(params): Query<VerifyParams>) -> Response {
    match state.shared.auth.verify(&params.token) {
        Ok(tenant) => Json(json!({ "valid": true, "user_id": tenant.user_id })).into_response(),
        Err(_) => Json(json!({ "valid": false })).into_response(),
    }
}

pub async fn refresh(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing Authorization header" }))).into_response();
    };

    match state.shared.auth.refresh(token) {
        Ok(new_token) => Json(json!({ "token": new_token })).into_response(),
        Err(e) => (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

pub async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn server_info(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "embedding_dim": state.shared.config.embedding_dimension,
        "llm_provider": format!("{:?}", state.shared.config.llm_provider),
    }))
    .into_response()
}
