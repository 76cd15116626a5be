//! 指标快照
//!
//! - GET /api/metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use station_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            plc_poll_failures: snapshot.plc_poll_failures,
            heartbeat_failures: snapshot.heartbeat_failures,
            trigger_cycles: snapshot.trigger_cycles,
            axis_read_failures: snapshot.axis_read_failures,
            axis_backoffs: snapshot.axis_backoffs,
            tightening_completions: snapshot.tightening_completions,
            tightening_qualified: snapshot.tightening_qualified,
            tightening_rejected: snapshot.tightening_rejected,
            tightening_timeouts: snapshot.tightening_timeouts,
            records_persisted: snapshot.records_persisted,
            persistence_failures: snapshot.persistence_failures,
            upload_success: snapshot.upload_success,
            upload_failure: snapshot.upload_failure,
            retry_attempts: snapshot.retry_attempts,
            connection_drops: snapshot.connection_drops,
        })),
    )
        .into_response()
}
