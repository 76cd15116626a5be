//! 生产记录内存实现

use crate::error::StorageError;
use crate::traits::RecordStore;
use domain::{ProductionRecord, UploadStatus};
use std::collections::HashMap;
use std::sync::RwLock;

/// 生产记录内存存储（按 `record_id` 索引）
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, ProductionRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录数量（用于测试）
    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: &ProductionRecord) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        if records.contains_key(&record.record_id) {
            return Err(StorageError::conflict(&record.record_id));
        }
        records.insert(record.record_id.clone(), record.clone());
        Ok(())
    }

    async fn mark_uploaded(
        &self,
        record_id: &str,
        uploaded_at_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        let Some(record) = records.get_mut(record_id) else {
            return Ok(false);
        };
        record.upload_status = UploadStatus::Uploaded;
        record.uploaded_at_ms = Some(uploaded_at_ms);
        Ok(true)
    }

    async fn mark_failed(&self, record_id: &str) -> Result<bool, StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        let Some(record) = records.get_mut(record_id) else {
            return Ok(false);
        };
        record.upload_status = UploadStatus::Failed;
        Ok(true)
    }

    async fn find(&self, record_id: &str) -> Result<Option<ProductionRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        Ok(records.get(record_id).cloned())
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Vec<ProductionRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        let mut found: Vec<ProductionRecord> = records
            .values()
            .filter(|record| record.barcode == barcode)
            .cloned()
            .collect();
        found.sort_by_key(|record| record.created_at_ms);
        Ok(found)
    }

    async fn count_by_status(&self, status: UploadStatus) -> Result<u64, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        Ok(records
            .values()
            .filter(|record| record.upload_status == status)
            .count() as u64)
    }
}
