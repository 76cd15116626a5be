//! 数据库连接管理
//!
//! - connect_pool：建立 SQLite 连接池并建表
//!
//! 工位只有一个控制器实例，连接数限制为 4。

use crate::error::StorageError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

const CREATE_RECORDS: &str = "create table if not exists production_records (\
     record_id text primary key, \
     barcode text not null, \
     stages text not null, \
     created_at_ms integer not null, \
     completed_at_ms integer, \
     upload_status text not null, \
     uploaded_at_ms integer)";

const CREATE_RECORDS_INDEX: &str =
    "create index if not exists idx_production_records_barcode on production_records (barcode)";

const CREATE_QUEUE: &str = "create table if not exists upload_queue (\
     record_id text primary key, \
     barcode text not null, \
     payload text not null, \
     retry_count integer not null default 0, \
     created_at_ms integer not null, \
     last_attempt_ms integer not null)";

const CREATE_QUEUE_INDEX: &str =
    "create index if not exists idx_upload_queue_created on upload_queue (created_at_ms)";

/// 建立 SQLite 连接池
///
/// 数据库文件不存在时自动创建；内存库（`sqlite::memory:`）只保留一个连接，
/// 保证所有查询落在同一个库上。
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// 建表（幂等）
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    for statement in [
        CREATE_RECORDS,
        CREATE_RECORDS_INDEX,
        CREATE_QUEUE,
        CREATE_QUEUE_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
