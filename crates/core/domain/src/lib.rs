//! 工位领域模型：所有能力模块共享的设备、采样、生产记录与事件定义。

pub mod device;
pub mod event;
pub mod record;
pub mod tightening;

pub use device::{CommunicationEndpoint, DeviceConnectionState, DeviceKind};
pub use event::StationEvent;
pub use record::{
    EXTERNAL_STAGE_COUNT, ProductionRecord, RecordError, STAGE_COUNT, TIGHTENING_STAGE_INDEX,
    UNKNOWN_BARCODE, UploadQueueEntry, UploadStatus,
};
pub use tightening::{
    COMMAND_IDLE, COMMAND_START, COMPLETED_TORQUE_EPSILON, CompletionSignal, TERMINAL_STATUS_MIN,
    TighteningAxisSample, TighteningStatus, detect_completion,
};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
