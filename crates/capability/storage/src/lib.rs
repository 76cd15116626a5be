//! # 工位存储模块
//!
//! 生产记录与上传重试队列的存储抽象，以及 SQLite / 内存两种实现。
//!
//! ## 模块说明
//!
//! - [`traits`]：`RecordStore`、`UploadQueueStore` 接口
//! - [`error`]：存储错误类型
//! - [`connection`]：SQLite 连接池与建表
//! - [`in_memory`]：`RwLock` 内存实现（测试、试运行）
//! - [`sqlite`]：SQLite 实现（工位本地数据库）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use station_storage::{RecordStore, SqliteRecordStore, connect_pool};
//!
//! let pool = connect_pool("sqlite://station.db?mode=rwc").await?;
//! let records = SqliteRecordStore::new(pool.clone());
//! let history = records.find_by_barcode("SN-001").await?;
//! ```
//!
//! ## 约束
//!
//! - 记录在任何上传尝试之前落库，落库后不可覆盖
//! - 队列条目只在上传成功后删除；达到重试上限的条目保留，等待人工处理

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod sqlite;
pub mod traits;

pub use connection::*;
pub use error::*;
pub use traits::*;

pub use in_memory::{InMemoryRecordStore, InMemoryUploadQueueStore};
pub use sqlite::{SqliteRecordStore, SqliteUploadQueueStore};
