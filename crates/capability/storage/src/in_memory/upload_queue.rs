//! 上传重试队列内存实现

use crate::error::StorageError;
use crate::traits::UploadQueueStore;
use domain::UploadQueueEntry;
use std::sync::RwLock;

/// 上传重试队列内存存储（按入队顺序保存）
#[derive(Default)]
pub struct InMemoryUploadQueueStore {
    entries: RwLock<Vec<UploadQueueEntry>>,
}

impl InMemoryUploadQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_age(mut items: Vec<UploadQueueEntry>) -> Vec<UploadQueueEntry> {
    items.sort_by_key(|entry| entry.created_at_ms);
    items
}

#[async_trait::async_trait]
impl UploadQueueStore for InMemoryUploadQueueStore {
    async fn enqueue(&self, entry: UploadQueueEntry) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        if let Some(existing) = entries.iter_mut().find(|e| e.record_id == entry.record_id) {
            *existing = entry;
        } else {
            entries.push(entry);
        }
        Ok(())
    }

    async fn list_retryable(
        &self,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<UploadQueueEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        let items: Vec<UploadQueueEntry> = entries
            .iter()
            .filter(|entry| !entry.needs_attention(max_retries))
            .cloned()
            .collect();
        let mut items = sorted_by_age(items);
        items.truncate(limit);
        Ok(items)
    }

    async fn record_failure(
        &self,
        record_id: &str,
        attempted_at_ms: i64,
    ) -> Result<Option<u32>, StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        let Some(entry) = entries.iter_mut().find(|e| e.record_id == record_id) else {
            return Ok(None);
        };
        entry.retry_count = entry.retry_count.saturating_add(1);
        entry.last_attempt_ms = attempted_at_ms;
        Ok(Some(entry.retry_count))
    }

    async fn remove(&self, record_id: &str) -> Result<bool, StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::lock_poisoned())?;
        let before = entries.len();
        entries.retain(|e| e.record_id != record_id);
        Ok(entries.len() != before)
    }

    async fn list_needing_attention(
        &self,
        max_retries: u32,
    ) -> Result<Vec<UploadQueueEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        let items = entries
            .iter()
            .filter(|entry| entry.needs_attention(max_retries))
            .cloned()
            .collect();
        Ok(sorted_by_age(items))
    }

    async fn len(&self) -> Result<u64, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::lock_poisoned())?;
        Ok(entries.len() as u64)
    }
}
