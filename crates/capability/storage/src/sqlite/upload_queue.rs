//! SQLite 上传重试队列实现

use crate::error::StorageError;
use crate::traits::UploadQueueStore;
use domain::UploadQueueEntry;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteUploadQueueStore {
    pub pool: SqlitePool,
}

impl SqliteUploadQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<UploadQueueEntry, StorageError> {
    let retry_count: i64 = row.try_get("retry_count")?;
    Ok(UploadQueueEntry {
        record_id: row.try_get("record_id")?,
        barcode: row.try_get("barcode")?,
        payload: row.try_get("payload")?,
        retry_count: retry_count.clamp(0, u32::MAX as i64) as u32,
        created_at_ms: row.try_get("created_at_ms")?,
        last_attempt_ms: row.try_get("last_attempt_ms")?,
    })
}

#[async_trait::async_trait]
impl UploadQueueStore for SqliteUploadQueueStore {
    async fn enqueue(&self, entry: UploadQueueEntry) -> Result<(), StorageError> {
        sqlx::query(
            "insert into upload_queue \
             (record_id, barcode, payload, retry_count, created_at_ms, last_attempt_ms) \
             values (?1, ?2, ?3, ?4, ?5, ?6) \
             on conflict(record_id) do update set \
             payload = excluded.payload, \
             retry_count = excluded.retry_count, \
             created_at_ms = excluded.created_at_ms, \
             last_attempt_ms = excluded.last_attempt_ms",
        )
        .bind(&entry.record_id)
        .bind(&entry.barcode)
        .bind(&entry.payload)
        .bind(entry.retry_count as i64)
        .bind(entry.created_at_ms)
        .bind(entry.last_attempt_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_retryable(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<UploadQueueEntry>, StorageError> {
        let rows = sqlx::query(
            "select record_id, barcode, payload, retry_count, created_at_ms, last_attempt_ms \
             from upload_queue \
             where retry_count < ?1 \
             order by created_at_ms asc, record_id asc \
             limit ?2",
        )
        .bind(max_retries as i64)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn record_failure(
        &self,
        record_id: &str,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>, StorageError> {
        let row = sqlx::query(
            "update upload_queue set retry_count = retry_count + 1, last_attempt_ms = ?1 \
             where record_id = ?2 \
             returning retry_count",
        )
        .bind(attempted_at_ms)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let retry_count: i64 = row.try_get("retry_count")?;
        Ok(Some(retry_count.clamp(0, u32::MAX as i64) as u32))
    }

    async fn remove(&self, record_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from upload_queue where record_id = ?1")
            .bind(record_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_needing_attention(
        &self,
        max_retries: u32,
    ) -> Result<Vec<UploadQueueEntry>, StorageError> {
        let rows = sqlx::query(
            "select record_id, barcode, payload, retry_count, created_at_ms, last_attempt_ms \
             from upload_queue \
             where retry_count >= ?1 \
             order by created_at_ms asc, record_id asc",
        )
        .bind(max_retries as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn len(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("select count(*) from upload_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
