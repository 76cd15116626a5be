//! 生产记录与上传队列条目。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 外部（线体上位机）提供的工序数量。
pub const EXTERNAL_STAGE_COUNT: usize = 3;
/// 一条生产记录的工序槽位总数（3 个外部 + 1 个本地拧紧）。
pub const STAGE_COUNT: usize = 4;
/// 拧紧工序所在槽位。
pub const TIGHTENING_STAGE_INDEX: usize = 3;
/// 条码无法解析时使用的占位条码。
pub const UNKNOWN_BARCODE: &str = "UNKNOWN";

/// 上传状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "uploaded" => UploadStatus::Uploaded,
            "failed" => UploadStatus::Failed,
            _ => UploadStatus::Pending,
        }
    }
}

/// 生产记录写入错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("invalid stage index: {0}")]
    InvalidStage(usize),
    #[error("stage slot {0} already filled")]
    SlotOccupied(usize),
    #[error("record already complete")]
    AlreadyComplete,
}

/// 单件产品的生产记录。
///
/// 记录以 `record_id` 为身份；条码可能重复（占位条码、重新上线的产品），
/// 同一条码的多条记录各自独立保存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRecord {
    pub record_id: String,
    pub barcode: String,
    pub stages: [Option<serde_json::Value>; STAGE_COUNT],
    pub created_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub upload_status: UploadStatus,
    pub uploaded_at_ms: Option<i64>,
}

impl ProductionRecord {
    pub fn new(barcode: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            barcode: barcode.into(),
            stages: [None, None, None, None],
            created_at_ms,
            completed_at_ms: None,
            upload_status: UploadStatus::Pending,
            uploaded_at_ms: None,
        }
    }

    /// 所有槽位均已填充。
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(Option::is_some)
    }

    pub fn filled_count(&self) -> usize {
        self.stages.iter().filter(|stage| stage.is_some()).count()
    }

    /// 写入一个工序槽位。
    ///
    /// 已填充的槽位和已完成的记录都拒绝写入，返回值表示本次写入是否使记录完成。
    pub fn fill_stage(
        &mut self,
        index: usize,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> Result<bool, RecordError> {
        if index >= STAGE_COUNT {
            return Err(RecordError::InvalidStage(index));
        }
        if self.is_complete() {
            return Err(RecordError::AlreadyComplete);
        }
        if self.stages[index].is_some() {
            return Err(RecordError::SlotOccupied(index));
        }
        self.stages[index] = Some(payload);
        if self.is_complete() {
            self.completed_at_ms = Some(now_ms);
            return Ok(true);
        }
        Ok(false)
    }

    /// 组装上传/持久化用的生产文档（工序按槽位顺序排列）。
    pub fn document(&self) -> serde_json::Value {
        let stages: Vec<serde_json::Value> = self
            .stages
            .iter()
            .map(|stage| stage.clone().unwrap_or(serde_json::Value::Null))
            .collect();
        serde_json::json!({
            "recordId": self.record_id,
            "barcode": self.barcode,
            "stages": stages,
            "createdAtMs": self.created_at_ms,
            "completedAtMs": self.completed_at_ms,
        })
    }
}

/// 上传失败后进入重试队列的条目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQueueEntry {
    /// 对应生产记录的 `record_id`，队列按它去重
    pub record_id: String,
    pub barcode: String,
    pub payload: String,
    pub retry_count: u32,
    pub created_at_ms: i64,
    pub last_attempt_ms: i64,
}

impl UploadQueueEntry {
    pub fn new(
        record_id: impl Into<String>,
        barcode: impl Into<String>,
        payload: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            barcode: barcode.into(),
            payload: payload.into(),
            retry_count: 0,
            created_at_ms: now_ms,
            last_attempt_ms: now_ms,
        }
    }

    /// 重试次数达到上限后不再自动重试，需人工处理。
    pub fn needs_attention(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}
