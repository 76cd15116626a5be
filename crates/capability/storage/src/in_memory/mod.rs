//! 内存存储实现模块
//!
//! 用于测试和不落盘的试运行。
//!
//! 包含以下实现：
//! - RecordStore: InMemoryRecordStore
//! - UploadQueueStore: InMemoryUploadQueueStore

pub mod record;
pub mod upload_queue;

pub use record::*;
pub use upload_queue::*;
