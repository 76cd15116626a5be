//! 存储接口 Trait 定义
//!
//! - RecordStore：生产记录存储
//! - UploadQueueStore：上传重试队列
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发
//! - 记录与队列条目以 `record_id` 为键，条码可重复
//! - 已落库的记录不可覆盖

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{ProductionRecord, UploadQueueEntry, UploadStatus};

/// 生产记录存储接口
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 保存一条新的生产记录；`record_id` 已存在时返回 `Conflict` 错误
    async fn save(&self, record: &ProductionRecord) -> Result<(), StorageError>;

    /// 标记为已上传，返回记录是否存在
    async fn mark_uploaded(
        &self,
        record_id: &str,
        uploaded_at_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 标记为上传失败，返回记录是否存在
    async fn mark_failed(&self, record_id: &str) -> Result<bool, StorageError>;

    /// 按记录 ID 查找
    async fn find(&self, record_id: &str) -> Result<Option<ProductionRecord>, StorageError>;

    /// 同一条码下的全部记录，按创建时间升序
    async fn find_by_barcode(&self, barcode: &str) -> Result<Vec<ProductionRecord>, StorageError>;

    /// 按上传状态计数
    async fn count_by_status(&self, status: UploadStatus) -> Result<u64, StorageError>;
}

/// 上传重试队列接口
#[async_trait]
pub trait UploadQueueStore: Send + Sync {
    /// 入队；同一记录已在队列中时替换负载并重置重试次数
    async fn enqueue(&self, entry: UploadQueueEntry) -> Result<(), StorageError>;

    /// 取出可重试条目（`retry_count < max_retries`），按入队时间升序，最多 `limit` 条
    async fn list_retryable(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<UploadQueueEntry>, StorageError>;

    /// 记录一次失败的重试，返回新的重试次数（条目不存在时返回 None）
    async fn record_failure(
        &self,
        record_id: &str,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>, StorageError>;

    /// 移除条目，返回是否存在
    async fn remove(&self, record_id: &str) -> Result<bool, StorageError>;

    /// 已达重试上限、需人工处理的条目
    async fn list_needing_attention(
        &self,
        max_retries: u32,
    ) -> Result<Vec<UploadQueueEntry>, StorageError>;

    /// 队列条目总数
    async fn len(&self) -> Result<u64, StorageError>;
}
