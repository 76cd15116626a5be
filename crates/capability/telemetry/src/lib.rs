//! 追踪初始化、请求 ID 生成与工位计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub plc_poll_failures: u64,
    pub heartbeat_failures: u64,
    pub trigger_cycles: u64,
    pub axis_read_failures: u64,
    pub axis_backoffs: u64,
    pub tightening_completions: u64,
    pub tightening_qualified: u64,
    pub tightening_rejected: u64,
    pub tightening_timeouts: u64,
    pub records_persisted: u64,
    pub persistence_failures: u64,
    pub upload_success: u64,
    pub upload_failure: u64,
    pub retry_attempts: u64,
    pub connection_drops: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    plc_poll_failures: AtomicU64,
    heartbeat_failures: AtomicU64,
    trigger_cycles: AtomicU64,
    axis_read_failures: AtomicU64,
    axis_backoffs: AtomicU64,
    tightening_completions: AtomicU64,
    tightening_qualified: AtomicU64,
    tightening_rejected: AtomicU64,
    tightening_timeouts: AtomicU64,
    records_persisted: AtomicU64,
    persistence_failures: AtomicU64,
    upload_success: AtomicU64,
    upload_failure: AtomicU64,
    retry_attempts: AtomicU64,
    connection_drops: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            plc_poll_failures: AtomicU64::new(0),
            heartbeat_failures: AtomicU64::new(0),
            trigger_cycles: AtomicU64::new(0),
            axis_read_failures: AtomicU64::new(0),
            axis_backoffs: AtomicU64::new(0),
            tightening_completions: AtomicU64::new(0),
            tightening_qualified: AtomicU64::new(0),
            tightening_rejected: AtomicU64::new(0),
            tightening_timeouts: AtomicU64::new(0),
            records_persisted: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            upload_success: AtomicU64::new(0),
            upload_failure: AtomicU64::new(0),
            retry_attempts: AtomicU64::new(0),
            connection_drops: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plc_poll_failures: self.plc_poll_failures.load(Ordering::Relaxed),
            heartbeat_failures: self.heartbeat_failures.load(Ordering::Relaxed),
            trigger_cycles: self.trigger_cycles.load(Ordering::Relaxed),
            axis_read_failures: self.axis_read_failures.load(Ordering::Relaxed),
            axis_backoffs: self.axis_backoffs.load(Ordering::Relaxed),
            tightening_completions: self.tightening_completions.load(Ordering::Relaxed),
            tightening_qualified: self.tightening_qualified.load(Ordering::Relaxed),
            tightening_rejected: self.tightening_rejected.load(Ordering::Relaxed),
            tightening_timeouts: self.tightening_timeouts.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            upload_success: self.upload_success.load(Ordering::Relaxed),
            upload_failure: self.upload_failure.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            connection_drops: self.connection_drops.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing。
///
/// `RUST_LOG` 优先；未设置时使用 `STATION_LOG_LEVEL`，再缺省为 info。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("STATION_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录 PLC 触发寄存器读取失败次数。
pub fn record_plc_poll_failure() {
    metrics().plc_poll_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳写入失败次数。
pub fn record_heartbeat_failure() {
    metrics().heartbeat_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录处理完成的触发周期（扫码或拧紧）。
pub fn record_trigger_cycle() {
    metrics().trigger_cycles.fetch_add(1, Ordering::Relaxed);
}

/// 记录拧紧轴寄存器读取失败次数。
pub fn record_axis_read_failure() {
    metrics().axis_read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录拧紧轴轮询进入冷却的次数。
pub fn record_axis_backoff() {
    metrics().axis_backoffs.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次拧紧完成及其合格判定。
pub fn record_tightening_completion(qualified: bool) {
    let metrics = metrics();
    metrics
        .tightening_completions
        .fetch_add(1, Ordering::Relaxed);
    if qualified {
        metrics.tightening_qualified.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.tightening_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录拧紧等待超时次数。
pub fn record_tightening_timeout() {
    metrics().tightening_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录生产记录落库次数。
pub fn record_record_persisted() {
    metrics().records_persisted.fetch_add(1, Ordering::Relaxed);
}

/// 记录生产记录落库失败次数。
pub fn record_persistence_failure() {
    metrics()
        .persistence_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录上传成功次数。
pub fn record_upload_success() {
    metrics().upload_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录上传失败次数。
pub fn record_upload_failure() {
    metrics().upload_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试上传尝试次数。
pub fn record_retry_attempt() {
    metrics().retry_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备链路断开次数。
pub fn record_connection_drop() {
    metrics().connection_drops.fetch_add(1, Ordering::Relaxed);
}
