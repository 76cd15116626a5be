//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：conflict_error, unavailable_error, internal_error
//! - DTO 转换：snapshot_to_dto, sample_to_dto, queue_entry_to_dto

use crate::session::{SessionError, StationSnapshot};
use api_contract::{
    ApiResponse, AxisSampleDto, DeviceStatusDto, StationStatusDto, UploadQueueEntryDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{TighteningAxisSample, UploadQueueEntry};

/// 状态冲突（重复启动、未运行时停止）
pub fn conflict_error(err: SessionError) -> Response {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::<()>::error("SYSTEM.STATE_CONFLICT", err.to_string())),
    )
        .into_response()
}

/// 设备不可用（初始化失败）
pub fn unavailable_error(err: SessionError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::<()>::error("DEVICE.UNAVAILABLE", err.to_string())),
    )
        .into_response()
}

pub fn internal_error(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", err.to_string())),
    )
        .into_response()
}

/// 会话错误统一映射
pub fn session_error(err: SessionError) -> Response {
    match err {
        SessionError::AlreadyRunning | SessionError::NotRunning => conflict_error(err),
        SessionError::PlcUnavailable(_) => unavailable_error(err),
        SessionError::Aggregator(_) => internal_error(err),
    }
}

pub fn snapshot_to_dto(snapshot: StationSnapshot) -> StationStatusDto {
    StationStatusDto {
        running: snapshot.running,
        handshake_state: format!("{:?}", snapshot.handshake_state),
        current_barcode: snapshot.current_barcode,
        devices: snapshot
            .devices
            .into_iter()
            .map(|device| DeviceStatusDto {
                device: device.device.name().to_string(),
                state: format!("{:?}", device.state),
                connected: device.state.is_connected(),
                configured: device.configured,
            })
            .collect(),
        current_sample: snapshot.current_sample.as_ref().map(sample_to_dto),
        partial_records: snapshot.stats.partial_records,
        unsaved_records: snapshot.stats.unsaved_records,
        retryable_uploads: snapshot.stats.retryable,
        needs_attention: snapshot.stats.needs_attention,
        failed_records: snapshot.stats.failed_records,
    }
}

pub fn sample_to_dto(sample: &TighteningAxisSample) -> AxisSampleDto {
    AxisSampleDto {
        ts_ms: sample.ts_ms,
        control_command: sample.control_command,
        running_status_code: sample.running_status_code,
        status: sample.status.label().to_string(),
        error_code: sample.error_code,
        completed_torque: sample.completed_torque,
        realtime_torque: sample.realtime_torque,
        target_torque: sample.target_torque,
        lower_limit_torque: sample.lower_limit_torque,
        upper_limit_torque: sample.upper_limit_torque,
        realtime_angle: sample.realtime_angle,
        qualified_count: sample.qualified_count,
        is_running: sample.is_running(),
        is_operation_completed: sample.is_operation_completed(),
        is_qualified: sample.is_qualified(),
        quality_result: sample.quality_result().to_string(),
        torque_achievement_rate: sample.torque_achievement_rate(),
    }
}

pub fn queue_entry_to_dto(entry: UploadQueueEntry) -> UploadQueueEntryDto {
    UploadQueueEntryDto {
        record_id: entry.record_id,
        barcode: entry.barcode,
        retry_count: entry.retry_count,
        created_at_ms: entry.created_at_ms,
        last_attempt_ms: entry.last_attempt_ms,
    }
}
