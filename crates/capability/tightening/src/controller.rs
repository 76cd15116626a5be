//! 拧紧轴控制器
//!
//! 通过寄存器链路驱动拧紧轴：下发参数与启动字，按固定间隔轮询寄存器块，
//! 由 [`CompletionDetector`] 判定周期完成。轮询循环由 `CancellationToken` 停止。

use crate::detector::CompletionDetector;
use crate::error::TighteningError;
use crate::registers::{AXIS_BLOCK_LEN, AxisRegisterMap, TighteningParams};
use domain::{COMMAND_IDLE, COMMAND_START, TighteningAxisSample, now_epoch_ms};
use station_protocol::RegisterClient;
use station_telemetry::{
    record_axis_backoff, record_axis_read_failure, record_tightening_completion,
    record_tightening_timeout,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 拧紧轴控制参数
#[derive(Debug, Clone)]
pub struct AxisControllerConfig {
    pub register_map: AxisRegisterMap,
    pub poll_interval: Duration,
    /// 连续读取失败达到该值后进入冷却
    pub failure_threshold: u32,
    pub recovery_delay: Duration,
    /// 启动轮询前先读一次已知寄存器
    pub validate_on_init: bool,
    pub max_operation_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
}

impl Default for AxisControllerConfig {
    fn default() -> Self {
        Self {
            register_map: AxisRegisterMap::default(),
            poll_interval: Duration::from_millis(2000),
            failure_threshold: 3,
            recovery_delay: Duration::from_millis(5000),
            validate_on_init: true,
            max_operation_timeout: Duration::from_secs(30),
            max_reconnect_attempts: 3,
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

impl AxisControllerConfig {
    fn sanitized(mut self) -> Self {
        if self.failure_threshold == 0 {
            self.failure_threshold = 1;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_millis(1);
        }
        self
    }
}

/// 当前拧紧周期
#[derive(Debug, Clone, PartialEq)]
pub enum CycleState {
    Idle,
    Started { started_at_ms: i64 },
    Completed(TighteningAxisSample),
}

/// 连续失败计数
#[derive(Debug, Clone)]
pub struct FailureTracker {
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    /// 记一次失败；达到阈值时返回 true 并清零
    pub fn on_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            self.consecutive = 0;
            return true;
        }
        false
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// 拧紧轴控制器
pub struct TighteningAxisController {
    link: Arc<dyn RegisterClient>,
    config: AxisControllerConfig,
    detector: Mutex<CompletionDetector>,
    polling_armed: AtomicBool,
    latest: watch::Sender<Option<TighteningAxisSample>>,
    cycle: watch::Sender<CycleState>,
    samples: broadcast::Sender<TighteningAxisSample>,
    completed_cycles: AtomicU64,
}

impl TighteningAxisController {
    pub fn new(link: Arc<dyn RegisterClient>, config: AxisControllerConfig) -> Self {
        let (latest, _) = watch::channel(None);
        let (cycle, _) = watch::channel(CycleState::Idle);
        let (samples, _) = broadcast::channel(64);
        // 未开启初始化校验时直接视为就绪
        let polling_armed = AtomicBool::new(!config.validate_on_init);
        Self {
            link,
            config: config.sanitized(),
            detector: Mutex::new(CompletionDetector::new()),
            polling_armed,
            latest,
            cycle,
            samples,
            completed_cycles: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AxisControllerConfig {
        &self.config
    }

    pub fn is_polling_armed(&self) -> bool {
        self.polling_armed.load(Ordering::SeqCst)
    }

    pub fn is_link_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// 最近一次采样
    pub fn current_sample(&self) -> Option<TighteningAxisSample> {
        self.latest.borrow().clone()
    }

    /// 已宣告完成的周期数
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::Relaxed)
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle.borrow().clone()
    }

    /// 订阅采样流
    pub fn subscribe_samples(&self) -> broadcast::Receiver<TighteningAxisSample> {
        self.samples.subscribe()
    }

    fn with_detector<R>(&self, f: impl FnOnce(&mut CompletionDetector) -> R) -> R {
        let mut guard = match self.detector.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// 下发参数并启动拧紧
    pub async fn start(&self, params: TighteningParams) -> Result<(), TighteningError> {
        if !self.is_polling_armed() {
            return Err(TighteningError::NotArmed);
        }
        params.validate().map_err(TighteningError::InvalidParams)?;
        let map = self.config.register_map;
        self.link
            .write_registers(map.params(), &params.to_registers())
            .await?;
        self.link.write_register(map.command(), COMMAND_START).await?;

        self.with_detector(|detector| detector.arm());
        self.cycle.send_replace(CycleState::Started {
            started_at_ms: now_epoch_ms(),
        });
        info!(
            target: "station.tightening",
            target_torque = params.target_torque,
            lower_limit = params.lower_limit,
            upper_limit = params.upper_limit,
            "tightening_started"
        );
        Ok(())
    }

    /// 停止拧紧（写控制字 0）
    pub async fn stop(&self) -> Result<(), TighteningError> {
        self.with_detector(|detector| detector.disarm());
        self.cycle.send_replace(CycleState::Idle);
        self.link
            .write_register(self.config.register_map.command(), COMMAND_IDLE)
            .await?;
        info!(target: "station.tightening", "tightening_stopped");
        Ok(())
    }

    /// 轮询一次寄存器块
    pub async fn poll_once(&self) -> Result<TighteningAxisSample, TighteningError> {
        let map = self.config.register_map;
        let words = self
            .link
            .read_holding_registers(map.base, AXIS_BLOCK_LEN)
            .await?;
        let previous = self.with_detector(|detector| detector.previous_command());
        let sample = map.decode(&words, previous, now_epoch_ms())?;
        let signal = self.with_detector(|detector| {
            detector.observe(
                sample.control_command,
                sample.running_status_code,
                sample.completed_torque,
            )
        });

        debug!(
            command = sample.control_command,
            status_code = sample.running_status_code,
            realtime_torque = sample.realtime_torque,
            "axis sample"
        );
        self.latest.send_replace(Some(sample.clone()));
        let _ = self.samples.send(sample.clone());

        if let Some(signal) = signal {
            let qualified = sample.is_qualified();
            self.completed_cycles.fetch_add(1, Ordering::Relaxed);
            record_tightening_completion(qualified);
            info!(
                target: "station.tightening",
                signal = ?signal,
                status = sample.status.label(),
                completed_torque = sample.completed_torque,
                qualified = qualified,
                achievement_rate = sample.torque_achievement_rate(),
                "tightening_completed"
            );
            self.cycle.send_replace(CycleState::Completed(sample.clone()));
        }
        Ok(sample)
    }

    /// 初始化校验：读一次控制字寄存器
    pub async fn validate(&self) -> Result<(), TighteningError> {
        match self
            .link
            .read_register(self.config.register_map.command())
            .await
        {
            Ok(_) => {
                self.polling_armed.store(true, Ordering::SeqCst);
                info!(target: "station.tightening", "axis_validated");
                Ok(())
            }
            Err(err) => {
                self.polling_armed.store(false, Ordering::SeqCst);
                warn!(target: "station.tightening", error = %err, "axis_validation_failed");
                Err(TighteningError::ValidationFailed(err.to_string()))
            }
        }
    }

    /// 等待当前周期完成
    ///
    /// 实际等待时间不超过 `max_operation_timeout`；超时后撤销本周期，不自动重试。
    pub async fn wait_for_completion(
        &self,
        timeout: Duration,
    ) -> Result<TighteningAxisSample, TighteningError> {
        let limit = timeout.min(self.config.max_operation_timeout);
        let mut rx = self.cycle.subscribe();
        let wait = async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    CycleState::Completed(sample) => return Ok(sample),
                    CycleState::Idle => return Err(TighteningError::NoCycle),
                    CycleState::Started { .. } => {}
                }
                if rx.changed().await.is_err() {
                    return Err(TighteningError::Stopped);
                }
            }
        };
        match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => {
                record_tightening_timeout();
                self.with_detector(|detector| detector.disarm());
                self.cycle.send_replace(CycleState::Idle);
                warn!(
                    target: "station.tightening",
                    timeout_ms = limit.as_millis() as u64,
                    "tightening_timeout"
                );
                Err(TighteningError::Timeout(limit))
            }
        }
    }

    /// 轮询循环
    ///
    /// 连续失败达到阈值后冷却 `recovery_delay`；链路断开时按间隔重连，
    /// 超过次数上限后撤销就绪并退出。
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), TighteningError> {
        if self.config.validate_on_init {
            self.validate().await?;
        } else {
            self.polling_armed.store(true, Ordering::SeqCst);
        }
        info!(
            target: "station.tightening",
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "axis_polling_started"
        );

        let mut failures = FailureTracker::new(self.config.failure_threshold);
        let mut reconnect_attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if !self.link.is_connected() {
                if reconnect_attempts >= self.config.max_reconnect_attempts {
                    self.polling_armed.store(false, Ordering::SeqCst);
                    warn!(
                        target: "station.tightening",
                        attempts = reconnect_attempts,
                        "axis_reconnect_exhausted"
                    );
                    return Err(TighteningError::ReconnectExhausted(reconnect_attempts));
                }
                reconnect_attempts += 1;
                if !sleep_or_cancel(&cancel, self.config.reconnect_interval).await {
                    break;
                }
                match self.link.reconnect().await {
                    Ok(()) => {
                        info!(
                            target: "station.tightening",
                            attempt = reconnect_attempts,
                            "axis_reconnected"
                        );
                        reconnect_attempts = 0;
                        failures.on_success();
                    }
                    Err(err) => {
                        warn!(
                            target: "station.tightening",
                            attempt = reconnect_attempts,
                            error = %err,
                            "axis_reconnect_failed"
                        );
                    }
                }
                continue;
            }

            match self.poll_once().await {
                Ok(_) => failures.on_success(),
                Err(err) => {
                    record_axis_read_failure();
                    warn!(
                        target: "station.tightening",
                        error = %err,
                        consecutive = failures.consecutive() + 1,
                        "axis_poll_failed"
                    );
                    if failures.on_failure() {
                        record_axis_backoff();
                        warn!(
                            target: "station.tightening",
                            recovery_delay_ms = self.config.recovery_delay.as_millis() as u64,
                            "axis_polling_backoff"
                        );
                        if !sleep_or_cancel(&cancel, self.config.recovery_delay).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            if !sleep_or_cancel(&cancel, self.config.poll_interval).await {
                break;
            }
        }
        info!(target: "station.tightening", "axis_polling_stopped");
        Ok(())
    }
}

/// 睡眠指定时长；被取消时返回 false
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
