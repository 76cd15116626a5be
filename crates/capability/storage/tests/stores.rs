use domain::{ProductionRecord, UNKNOWN_BARCODE, UploadQueueEntry, UploadStatus};
use serde_json::json;
use station_storage::{
    InMemoryRecordStore, InMemoryUploadQueueStore, RecordStore, SqliteRecordStore,
    SqliteUploadQueueStore, StorageErrorKind, UploadQueueStore, connect_pool,
};

fn complete_record(barcode: &str, created_at_ms: i64, marker: &str) -> ProductionRecord {
    let mut record = ProductionRecord::new(barcode, created_at_ms);
    for (index, value) in [json!({"unit": marker}), json!("b"), json!(3)]
        .into_iter()
        .enumerate()
    {
        record
            .fill_stage(index, value, created_at_ms + 100)
            .expect("fill external");
    }
    record
        .fill_stage(3, json!({"qualityResult": "Qualified"}), created_at_ms + 200)
        .expect("fill tightening");
    record
}

async fn exercise_record_store(store: &dyn RecordStore) {
    let record = complete_record("SN-001", 1_000, "A");
    store.save(&record).await.expect("save");

    let loaded = store
        .find(&record.record_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(loaded, record);
    assert_eq!(loaded.completed_at_ms, Some(1_200));
    assert_eq!(
        store.count_by_status(UploadStatus::Pending).await.expect("count"),
        1
    );

    assert!(store.mark_failed(&record.record_id).await.expect("mark failed"));
    assert_eq!(
        store.count_by_status(UploadStatus::Failed).await.expect("count"),
        1
    );

    assert!(
        store
            .mark_uploaded(&record.record_id, 5_000)
            .await
            .expect("mark uploaded")
    );
    let loaded = store
        .find(&record.record_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(loaded.upload_status, UploadStatus::Uploaded);
    assert_eq!(loaded.uploaded_at_ms, Some(5_000));

    assert!(!store.mark_uploaded("missing", 1).await.expect("missing"));
    assert!(store.find("missing").await.expect("find").is_none());
}

/// 同一条码的两件产品各自保存，已落库的记录不可被覆盖。
async fn exercise_records_never_overwritten(store: &dyn RecordStore) {
    let first = complete_record(UNKNOWN_BARCODE, 1_000, "A");
    let second = complete_record(UNKNOWN_BARCODE, 2_000, "B");
    store.save(&first).await.expect("save first");
    store.save(&second).await.expect("save second");

    let history = store
        .find_by_barcode(UNKNOWN_BARCODE)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].stages[0], Some(json!({"unit": "A"})));
    assert_eq!(history[1].stages[0], Some(json!({"unit": "B"})));

    let mut replay = first.clone();
    replay.stages[0] = Some(json!({"unit": "C"}));
    let err = store.save(&replay).await.expect_err("conflict");
    assert_eq!(err.kind(), StorageErrorKind::Conflict);
    let kept = store
        .find(&first.record_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(kept.stages[0], Some(json!({"unit": "A"})));
}

async fn exercise_queue_store(queue: &dyn UploadQueueStore) {
    queue
        .enqueue(UploadQueueEntry::new("rec-b", "SN-B", "{}", 2_000))
        .await
        .expect("enqueue");
    queue
        .enqueue(UploadQueueEntry::new("rec-a", "SN-A", "{}", 1_000))
        .await
        .expect("enqueue");
    queue
        .enqueue(UploadQueueEntry::new("rec-c", "SN-C", "{}", 3_000))
        .await
        .expect("enqueue");
    assert_eq!(queue.len().await.expect("len"), 3);

    // 最早入队的在前，受 limit 约束
    let batch = queue.list_retryable(2, 2).await.expect("batch");
    let barcodes: Vec<&str> = batch.iter().map(|e| e.barcode.as_str()).collect();
    assert_eq!(barcodes, vec!["SN-A", "SN-B"]);

    assert_eq!(queue.record_failure("rec-a", 4_000).await.expect("fail"), Some(1));
    assert_eq!(queue.record_failure("rec-a", 5_000).await.expect("fail"), Some(2));
    assert_eq!(queue.record_failure("missing", 5_000).await.expect("fail"), None);

    let batch = queue.list_retryable(2, 10).await.expect("batch");
    assert!(batch.iter().all(|e| e.record_id != "rec-a"));
    let attention = queue.list_needing_attention(2).await.expect("attention");
    assert_eq!(attention.len(), 1);
    assert_eq!(attention[0].barcode, "SN-A");
    assert_eq!(attention[0].last_attempt_ms, 5_000);

    assert!(queue.remove("rec-b").await.expect("remove"));
    assert!(!queue.remove("rec-b").await.expect("remove twice"));
    assert_eq!(queue.len().await.expect("len"), 2);
}

/// 同条码不同记录的队列条目互不覆盖。
async fn exercise_queue_keeps_each_record(queue: &dyn UploadQueueStore) {
    queue
        .enqueue(UploadQueueEntry::new("rec-1", UNKNOWN_BARCODE, "unit A", 1_000))
        .await
        .expect("enqueue");
    queue
        .enqueue(UploadQueueEntry::new("rec-2", UNKNOWN_BARCODE, "unit B", 2_000))
        .await
        .expect("enqueue");
    let batch = queue.list_retryable(5, 10).await.expect("batch");
    let payloads: Vec<&str> = batch.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["unit A", "unit B"]);
}

#[tokio::test]
async fn in_memory_record_store_round_trip() {
    let store = InMemoryRecordStore::new();
    exercise_record_store(&store).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn in_memory_records_are_never_overwritten() {
    let store = InMemoryRecordStore::new();
    exercise_records_never_overwritten(&store).await;
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn in_memory_queue_orders_and_caps() {
    exercise_queue_store(&InMemoryUploadQueueStore::new()).await;
}

#[tokio::test]
async fn in_memory_queue_keeps_each_record() {
    exercise_queue_keeps_each_record(&InMemoryUploadQueueStore::new()).await;
}

#[tokio::test]
async fn sqlite_record_store_round_trip() {
    let pool = connect_pool("sqlite::memory:").await.expect("pool");
    exercise_record_store(&SqliteRecordStore::new(pool)).await;
}

#[tokio::test]
async fn sqlite_records_are_never_overwritten() {
    let pool = connect_pool("sqlite::memory:").await.expect("pool");
    exercise_records_never_overwritten(&SqliteRecordStore::new(pool)).await;
}

#[tokio::test]
async fn sqlite_queue_orders_and_caps() {
    let pool = connect_pool("sqlite::memory:").await.expect("pool");
    exercise_queue_store(&SqliteUploadQueueStore::new(pool)).await;
}

#[tokio::test]
async fn sqlite_queue_keeps_each_record() {
    let pool = connect_pool("sqlite::memory:").await.expect("pool");
    exercise_queue_keeps_each_record(&SqliteUploadQueueStore::new(pool)).await;
}

#[tokio::test]
async fn enqueue_same_record_replaces_entry() {
    let queue = InMemoryUploadQueueStore::new();
    queue
        .enqueue(UploadQueueEntry::new("rec-1", "SN-1", "old", 1_000))
        .await
        .expect("enqueue");
    queue.record_failure("rec-1", 1_500).await.expect("fail");
    queue
        .enqueue(UploadQueueEntry::new("rec-1", "SN-1", "new", 2_000))
        .await
        .expect("enqueue");
    let batch = queue.list_retryable(5, 10).await.expect("batch");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].payload, "new");
    assert_eq!(batch[0].retry_count, 0);
}
