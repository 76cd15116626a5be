//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 单个设备的连接状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusDto {
    pub device: String,
    pub state: String,
    pub connected: bool,
    pub configured: bool,
}

/// 拧紧轴当前采样。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisSampleDto {
    pub ts_ms: i64,
    pub control_command: u16,
    pub running_status_code: u16,
    pub status: String,
    pub error_code: u16,
    pub completed_torque: f64,
    pub realtime_torque: f64,
    pub target_torque: f64,
    pub lower_limit_torque: f64,
    pub upper_limit_torque: f64,
    pub realtime_angle: f64,
    pub qualified_count: u16,
    pub is_running: bool,
    pub is_operation_completed: bool,
    pub is_qualified: bool,
    pub quality_result: String,
    pub torque_achievement_rate: f64,
}

/// 工位状态总览。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatusDto {
    pub running: bool,
    pub handshake_state: String,
    pub current_barcode: Option<String>,
    pub devices: Vec<DeviceStatusDto>,
    pub current_sample: Option<AxisSampleDto>,
    pub partial_records: usize,
    /// 已完成但尚未落库成功、等待补存的记录
    pub unsaved_records: usize,
    pub retryable_uploads: u64,
    pub needs_attention: u64,
    pub failed_records: u64,
}

/// 需人工处理的上传队列条目。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQueueEntryDto {
    pub record_id: String,
    pub barcode: String,
    pub retry_count: u32,
    pub created_at_ms: i64,
    pub last_attempt_ms: i64,
}

/// 系统指令的返回结构。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCommandResponse {
    pub running: bool,
    pub message: String,
}

/// 指标快照返回结构。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub plc_poll_failures: u64,
    pub heartbeat_failures: u64,
    pub trigger_cycles: u64,
    pub axis_read_failures: u64,
    pub axis_backoffs: u64,
    pub tightening_completions: u64,
    pub tightening_qualified: u64,
    pub tightening_rejected: u64,
    pub tightening_timeouts: u64,
    pub records_persisted: u64,
    pub persistence_failures: u64,
    pub upload_success: u64,
    pub upload_failure: u64,
    pub retry_attempts: u64,
    pub connection_drops: u64,
}
