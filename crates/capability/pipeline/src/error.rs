use domain::RecordError;
use station_storage::StorageError;

/// 汇总链路错误。
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// 工序槽位写入被拒绝（越界、重复、记录已完成）
    #[error("record error: {0}")]
    Record(#[from] RecordError),
    /// 生产记录落库失败（本周期失败）
    #[error("persistence error: {0}")]
    Persistence(String),
    /// 重试队列读写失败
    #[error("queue error: {0}")]
    Queue(String),
    #[error("payload error: {0}")]
    Payload(String),
}

impl From<StorageError> for AggregatorError {
    fn from(err: StorageError) -> Self {
        AggregatorError::Queue(err.to_string())
    }
}

/// 上传通道错误。
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("config error: {0}")]
    Config(String),
}
