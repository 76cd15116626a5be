//! 状态查询
//!
//! - GET /health
//! - GET /api/status
//! - GET /api/upload-queue/attention

use crate::AppState;
use crate::utils::response::{internal_error, queue_entry_to_dto, session_error, snapshot_to_dto};
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn get_status(State(state): State<AppState>) -> Response {
    match state.session.status().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(snapshot_to_dto(snapshot))),
        )
            .into_response(),
        Err(err) => session_error(err),
    }
}

pub async fn list_attention_entries(State(state): State<AppState>) -> Response {
    match state.session.aggregator().needing_attention().await {
        Ok(entries) => {
            let entries: Vec<_> = entries.into_iter().map(queue_entry_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(entries))).into_response()
        }
        Err(err) => internal_error(err),
    }
}
