use crate::error::AggregatorError;
use crate::transport::UploadTransport;
use domain::{
    EXTERNAL_STAGE_COUNT, ProductionRecord, RecordError, StationEvent, TIGHTENING_STAGE_INDEX,
    TighteningAxisSample, UNKNOWN_BARCODE, UploadQueueEntry, UploadStatus, now_epoch_ms,
};
use serde_json::Value;
use station_storage::{RecordStore, UploadQueueStore};
use station_telemetry::{
    record_persistence_failure, record_record_persisted, record_retry_attempt,
    record_upload_failure, record_upload_success,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 汇总参数。
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// 重试上限，达到后需人工处理
    pub max_retries: u32,
    /// 每轮重试的最大条目数
    pub batch_size: usize,
    pub retry_interval: Duration,
    /// 已完成条码索引的容量
    pub completed_index_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            batch_size: 20,
            retry_interval: Duration::from_secs(60),
            completed_index_capacity: 1024,
        }
    }
}

impl AggregatorConfig {
    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.retry_interval.is_zero() {
            self.retry_interval = Duration::from_secs(1);
        }
        self
    }
}

/// 单次写入的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 记录未完成，已填充的槽位数
    Partial { filled: usize },
    /// 记录完成并已落库，附带首次上传结果
    Completed { uploaded: bool },
}

/// 一轮重试的统计。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySweepReport {
    /// 本轮补存成功的记录（此前落库失败）
    pub recovered: usize,
    pub attempted: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub needs_attention: usize,
}

/// 汇总状态统计。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub partial_records: usize,
    /// 已完成但尚未落库成功的记录
    pub unsaved_records: usize,
    pub retryable: u64,
    pub needs_attention: u64,
    pub failed_records: u64,
}

/// 已完成条码索引（有界，先进先出淘汰）。
struct CompletedIndex {
    set: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl CompletedIndex {
    fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn contains(&self, barcode: &str) -> bool {
        self.set.contains(barcode)
    }

    fn insert(&mut self, barcode: String) {
        if self.capacity == 0 || !self.set.insert(barcode.clone()) {
            return;
        }
        self.order.push_back(barcode);
        while self.set.len() > self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.set.remove(&evicted);
                }
                None => break,
            }
        }
    }
}

struct AggregatorState {
    partial: HashMap<String, ProductionRecord>,
    /// 落库失败的完整记录，由重试循环补存
    unsaved: Vec<ProductionRecord>,
    completed: CompletedIndex,
}

impl AggregatorState {
    /// 条码对应的产品已经完成（已落库或等待补存）
    fn is_settled(&self, barcode: &str) -> bool {
        barcode != UNKNOWN_BARCODE
            && (self.completed.contains(barcode)
                || self.unsaved.iter().any(|record| record.barcode == barcode))
    }
}

struct AggregatorInner {
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn UploadQueueStore>,
    transport: Arc<dyn UploadTransport>,
    config: AggregatorConfig,
    state: Mutex<AggregatorState>,
    partial_count: AtomicUsize,
    unsaved_count: AtomicUsize,
    events: Option<broadcast::Sender<StationEvent>>,
}

/// 生产数据汇总入口。
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<AggregatorInner>,
}

impl Aggregator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn UploadQueueStore>,
        transport: Arc<dyn UploadTransport>,
    ) -> Self {
        Self::with_config(records, queue, transport, AggregatorConfig::default())
    }

    pub fn with_config(
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn UploadQueueStore>,
        transport: Arc<dyn UploadTransport>,
        config: AggregatorConfig,
    ) -> Self {
        let config = config.sanitized();
        let inner = AggregatorInner {
            records,
            queue,
            transport,
            state: Mutex::new(AggregatorState {
                partial: HashMap::new(),
                unsaved: Vec::new(),
                completed: CompletedIndex::new(config.completed_index_capacity),
            }),
            config,
            partial_count: AtomicUsize::new(0),
            unsaved_count: AtomicUsize::new(0),
            events: None,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// 发布工序状态事件（构造后、克隆前调用）。
    pub fn with_events(mut self, events: broadcast::Sender<StationEvent>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.events = Some(events);
        }
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// 未完成记录数（无锁读取）。
    pub fn partial_count(&self) -> usize {
        self.inner.partial_count.load(Ordering::Relaxed)
    }

    /// 已完成但尚未落库成功的记录数。
    pub fn unsaved_count(&self) -> usize {
        self.inner.unsaved_count.load(Ordering::Relaxed)
    }

    /// 写入外部工序数据（槽位 0..3）。
    pub async fn record_stage_data(
        &self,
        barcode: &str,
        stage_index: usize,
        payload: Value,
    ) -> Result<RecordOutcome, AggregatorError> {
        if stage_index >= EXTERNAL_STAGE_COUNT {
            return Err(RecordError::InvalidStage(stage_index).into());
        }
        self.fill(barcode, stage_index, payload).await
    }

    /// 写入本地拧紧结果（最后一个槽位）。
    pub async fn record_tightening_result(
        &self,
        barcode: &str,
        sample: &TighteningAxisSample,
    ) -> Result<RecordOutcome, AggregatorError> {
        let payload = tightening_payload(sample)?;
        self.fill(barcode, TIGHTENING_STAGE_INDEX, payload).await
    }

    async fn fill(
        &self,
        barcode: &str,
        index: usize,
        payload: Value,
    ) -> Result<RecordOutcome, AggregatorError> {
        let now = now_epoch_ms();
        let mut state = self.inner.state.lock().await;
        if state.is_settled(barcode) {
            return Err(RecordError::AlreadyComplete.into());
        }
        let record = state
            .partial
            .entry(barcode.to_string())
            .or_insert_with(|| ProductionRecord::new(barcode, now));
        let completed = record.fill_stage(index, payload, now)?;
        let filled = record.filled_count();
        let finished = if completed {
            state.partial.remove(barcode)
        } else {
            None
        };
        // 落库在锁内完成：完成索引只在落库成功后登记
        let persisted = match finished {
            Some(record) => Some(self.persist(&mut state, record).await),
            None => None,
        };
        self.refresh_counts(&state);
        drop(state);

        self.emit_status(barcode, &format!("Stage{}Recorded", index + 1));
        match persisted {
            None => Ok(RecordOutcome::Partial { filled }),
            Some(Err(err)) => Err(err),
            Some(Ok(record)) => {
                self.emit_status(&record.barcode, "Completed");
                let uploaded = self.upload(&record).await;
                Ok(RecordOutcome::Completed { uploaded })
            }
        }
    }

    /// 落库一条完整记录；失败时记录转入待补存列表，不会丢失。
    async fn persist(
        &self,
        state: &mut AggregatorState,
        record: ProductionRecord,
    ) -> Result<ProductionRecord, AggregatorError> {
        if let Err(err) = self.inner.records.save(&record).await {
            record_persistence_failure();
            error!(
                target: "station.pipeline",
                barcode = %record.barcode,
                record_id = %record.record_id,
                error = %err,
                document = %record.document(),
                "record_persist_failed"
            );
            state.unsaved.push(record);
            return Err(AggregatorError::Persistence(err.to_string()));
        }
        record_record_persisted();
        info!(
            target: "station.pipeline",
            barcode = %record.barcode,
            record_id = %record.record_id,
            "record_persisted"
        );
        // 占位条码不是产品身份，不进入已完成索引
        if record.barcode != UNKNOWN_BARCODE {
            state.completed.insert(record.barcode.clone());
        }
        Ok(record)
    }

    /// 补存此前落库失败的记录，成功的随即尝试上传；返回补存成功的条数。
    pub async fn persist_unsaved(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        if state.unsaved.is_empty() {
            return 0;
        }
        let pending = std::mem::take(&mut state.unsaved);
        let mut saved = Vec::new();
        for record in pending {
            if let Ok(record) = self.persist(&mut state, record).await {
                saved.push(record);
            }
        }
        self.refresh_counts(&state);
        drop(state);

        for record in &saved {
            self.emit_status(&record.barcode, "Completed");
            self.upload(record).await;
        }
        saved.len()
    }

    fn refresh_counts(&self, state: &AggregatorState) {
        self.inner
            .partial_count
            .store(state.partial.len(), Ordering::Relaxed);
        self.inner
            .unsaved_count
            .store(state.unsaved.len(), Ordering::Relaxed);
    }

    /// 上传一条已落库的记录；失败时标记 Failed 并入重试队列。
    pub async fn upload(&self, record: &ProductionRecord) -> bool {
        let barcode = record.barcode.as_str();
        let record_id = record.record_id.as_str();
        let payload = record.document().to_string();
        match self.inner.transport.upload(barcode, &payload).await {
            Ok(()) => {
                record_upload_success();
                if let Err(err) = self
                    .inner
                    .records
                    .mark_uploaded(record_id, now_epoch_ms())
                    .await
                {
                    warn!(target: "station.pipeline", barcode = %barcode, error = %err, "mark_uploaded_failed");
                }
                info!(target: "station.pipeline", barcode = %barcode, "record_uploaded");
                self.emit_status(barcode, UploadStatus::Uploaded.as_str());
                true
            }
            Err(err) => {
                record_upload_failure();
                warn!(target: "station.pipeline", barcode = %barcode, error = %err, "record_upload_failed");
                if let Err(err) = self.inner.records.mark_failed(record_id).await {
                    warn!(target: "station.pipeline", barcode = %barcode, error = %err, "mark_failed_failed");
                }
                let entry = UploadQueueEntry::new(record_id, barcode, payload, now_epoch_ms());
                if let Err(err) = self.inner.queue.enqueue(entry).await {
                    error!(target: "station.pipeline", barcode = %barcode, error = %err, "upload_enqueue_failed");
                }
                self.emit_status(barcode, UploadStatus::Failed.as_str());
                false
            }
        }
    }

    /// 一轮重试：先补存未落库的记录，再按入队顺序取一批可重试条目。
    pub async fn retry_sweep(&self) -> Result<RetrySweepReport, AggregatorError> {
        let recovered = self.persist_unsaved().await;
        let max_retries = self.inner.config.max_retries;
        let batch = self
            .inner
            .queue
            .list_retryable(max_retries, self.inner.config.batch_size)
            .await?;
        let mut report = RetrySweepReport {
            recovered,
            attempted: batch.len(),
            ..RetrySweepReport::default()
        };

        for entry in batch {
            record_retry_attempt();
            match self
                .inner
                .transport
                .upload(&entry.barcode, &entry.payload)
                .await
            {
                Ok(()) => {
                    record_upload_success();
                    self.inner.queue.remove(&entry.record_id).await?;
                    if let Err(err) = self
                        .inner
                        .records
                        .mark_uploaded(&entry.record_id, now_epoch_ms())
                        .await
                    {
                        warn!(target: "station.pipeline", barcode = %entry.barcode, error = %err, "mark_uploaded_failed");
                    }
                    report.uploaded += 1;
                    self.emit_status(&entry.barcode, UploadStatus::Uploaded.as_str());
                }
                Err(err) => {
                    record_upload_failure();
                    report.failed += 1;
                    let retry_count = self
                        .inner
                        .queue
                        .record_failure(&entry.record_id, now_epoch_ms())
                        .await?
                        .unwrap_or(entry.retry_count.saturating_add(1));
                    if retry_count >= max_retries {
                        warn!(
                            target: "station.pipeline",
                            barcode = %entry.barcode,
                            retry_count = retry_count,
                            error = %err,
                            "upload_needs_attention"
                        );
                    } else {
                        warn!(
                            target: "station.pipeline",
                            barcode = %entry.barcode,
                            retry_count = retry_count,
                            error = %err,
                            "upload_retry_failed"
                        );
                    }
                }
            }
        }

        report.needs_attention = self
            .inner
            .queue
            .list_needing_attention(max_retries)
            .await?
            .len();
        if report.attempted > 0 || report.recovered > 0 {
            info!(
                target: "station.pipeline",
                recovered = report.recovered,
                attempted = report.attempted,
                uploaded = report.uploaded,
                failed = report.failed,
                needs_attention = report.needs_attention,
                "retry_sweep_finished"
            );
        }
        Ok(report)
    }

    /// 后台重试循环，直到取消。
    pub async fn run_retry_loop(&self, cancel: CancellationToken) {
        info!(
            target: "station.pipeline",
            interval_secs = self.inner.config.retry_interval.as_secs(),
            "retry_loop_started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.retry_interval) => {}
            }
            if let Err(err) = self.retry_sweep().await {
                warn!(target: "station.pipeline", error = %err, "retry_sweep_failed");
            }
        }
        info!(target: "station.pipeline", "retry_loop_stopped");
    }

    /// 需人工处理的队列条目。
    pub async fn needing_attention(&self) -> Result<Vec<UploadQueueEntry>, AggregatorError> {
        Ok(self
            .inner
            .queue
            .list_needing_attention(self.inner.config.max_retries)
            .await?)
    }

    pub async fn stats(&self) -> Result<AggregatorStats, AggregatorError> {
        let total = self.inner.queue.len().await?;
        let needs_attention = self.needing_attention().await?.len() as u64;
        let failed_records = self
            .inner
            .records
            .count_by_status(UploadStatus::Failed)
            .await?;
        Ok(AggregatorStats {
            partial_records: self.partial_count(),
            unsaved_records: self.unsaved_count(),
            retryable: total.saturating_sub(needs_attention),
            needs_attention,
            failed_records,
        })
    }

    fn emit_status(&self, barcode: &str, status: &str) {
        if let Some(events) = &self.inner.events {
            let _ = events.send(StationEvent::ProcessStatusChanged {
                barcode: barcode.to_string(),
                status: status.to_string(),
            });
        }
    }
}

/// 拧紧槽位内容：采样本身加质量结论与达成率。
pub fn tightening_payload(sample: &TighteningAxisSample) -> Result<Value, AggregatorError> {
    let mut payload =
        serde_json::to_value(sample).map_err(|err| AggregatorError::Payload(err.to_string()))?;
    if let Some(object) = payload.as_object_mut() {
        object.insert(
            "qualityResult".to_string(),
            Value::from(sample.quality_result()),
        );
        object.insert(
            "torqueAchievementRate".to_string(),
            Value::from(sample.torque_achievement_rate()),
        );
        object.insert("isQualified".to_string(), Value::from(sample.is_qualified()));
        if let Some(reason) = sample.failure_reason() {
            object.insert("failureReason".to_string(), Value::from(reason));
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_index_evicts_oldest() {
        let mut index = CompletedIndex::new(2);
        index.insert("A".to_string());
        index.insert("B".to_string());
        index.insert("A".to_string());
        index.insert("C".to_string());
        assert!(!index.contains("A"));
        assert!(index.contains("B"));
        assert!(index.contains("C"));
    }
}
