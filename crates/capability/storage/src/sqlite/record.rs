//! SQLite 生产记录实现

use crate::error::StorageError;
use crate::traits::RecordStore;
use domain::{ProductionRecord, STAGE_COUNT, UploadStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SELECT_RECORD: &str = "select record_id, barcode, stages, created_at_ms, completed_at_ms, \
     upload_status, uploaded_at_ms from production_records";

pub struct SqliteRecordStore {
    pub pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ProductionRecord, StorageError> {
    let stages_text: String = row.try_get("stages")?;
    let stages: [Option<serde_json::Value>; STAGE_COUNT] = serde_json::from_str(&stages_text)?;
    let status: String = row.try_get("upload_status")?;
    Ok(ProductionRecord {
        record_id: row.try_get("record_id")?,
        barcode: row.try_get("barcode")?,
        stages,
        created_at_ms: row.try_get("created_at_ms")?,
        completed_at_ms: row.try_get("completed_at_ms")?,
        upload_status: UploadStatus::parse(&status),
        uploaded_at_ms: row.try_get("uploaded_at_ms")?,
    })
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &ProductionRecord) -> Result<(), StorageError> {
        let stages = serde_json::to_string(&record.stages)?;
        let result = sqlx::query(
            "insert into production_records \
             (record_id, barcode, stages, created_at_ms, completed_at_ms, upload_status, uploaded_at_ms) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             on conflict(record_id) do nothing",
        )
        .bind(&record.record_id)
        .bind(&record.barcode)
        .bind(stages)
        .bind(record.created_at_ms)
        .bind(record.completed_at_ms)
        .bind(record.upload_status.as_str())
        .bind(record.uploaded_at_ms)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::conflict(&record.record_id));
        }
        Ok(())
    }

    async fn mark_uploaded(
        &self,
        record_id: &str,
        uploaded_at_ms: i64,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update production_records set upload_status = ?1, uploaded_at_ms = ?2 \
             where record_id = ?3",
        )
        .bind(UploadStatus::Uploaded.as_str())
        .bind(uploaded_at_ms)
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, record_id: &str) -> Result<bool, StorageError> {
        let result =
            sqlx::query("update production_records set upload_status = ?1 where record_id = ?2")
                .bind(UploadStatus::Failed.as_str())
                .bind(record_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, record_id: &str) -> Result<Option<ProductionRecord>, StorageError> {
        let row = sqlx::query(&format!("{} where record_id = ?1", SELECT_RECORD))
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(record_from_row(&row)?))
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Vec<ProductionRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "{} where barcode = ?1 order by created_at_ms asc",
            SELECT_RECORD
        ))
        .bind(barcode)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count_by_status(&self, status: UploadStatus) -> Result<u64, StorageError> {
        let count: i64 =
            sqlx::query_scalar("select count(*) from production_records where upload_status = ?1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}
