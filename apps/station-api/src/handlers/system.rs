//! 系统指令
//!
//! - POST /api/system/start
//! - POST /api/system/stop
//! - POST /api/system/emergency-stop

use crate::AppState;
use crate::utils::response::session_error;
use api_contract::{ApiResponse, SystemCommandResponse};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

fn command_ok(running: bool, message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(SystemCommandResponse {
            running,
            message: message.into(),
        })),
    )
        .into_response()
}

pub async fn start_system(State(state): State<AppState>) -> Response {
    match state.session.start_system().await {
        Ok(report) => {
            let offline: Vec<&str> = domain::DeviceKind::ALL
                .into_iter()
                .filter(|device| report.get(*device) == Some(false))
                .map(|device| device.name())
                .collect();
            let message = if offline.is_empty() {
                "system started".to_string()
            } else {
                format!("system started, offline: {}", offline.join(", "))
            };
            command_ok(true, message)
        }
        Err(err) => session_error(err),
    }
}

pub async fn stop_system(State(state): State<AppState>) -> Response {
    match state.session.stop_system().await {
        Ok(()) => command_ok(false, "system stopped"),
        Err(err) => session_error(err),
    }
}

pub async fn emergency_stop(State(state): State<AppState>) -> Response {
    match state.session.emergency_stop().await {
        Ok(()) => command_ok(false, "emergency stop executed"),
        Err(err) => session_error(err),
    }
}
