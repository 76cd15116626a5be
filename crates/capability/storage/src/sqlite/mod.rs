//! # SQLite 存储实现模块
//!
//! 工位本地数据库，保存生产记录和上传重试队列。
//!
//! ## 数据库表
//!
//! - `production_records`：生产记录（record_id 主键，barcode 建普通索引，stages 为 JSON 文本）
//! - `upload_queue`：上传重试队列（record_id 主键，按 created_at_ms 升序处理）
//!
//! 表结构由 [`crate::connection::ensure_schema`] 创建。

pub mod record;
pub mod upload_queue;

pub use record::SqliteRecordStore;
pub use upload_queue::SqliteUploadQueueStore;
