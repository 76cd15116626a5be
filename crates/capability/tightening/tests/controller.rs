use async_trait::async_trait;
use domain::TighteningStatus;
use station_protocol::{ProtocolError, RegisterClient, encode_f32};
use station_tightening::{
    AxisControllerConfig, CycleState, TighteningAxisController, TighteningError, TighteningParams,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Step {
    Block(Vec<u16>),
    Fail,
}

/// 按脚本返回寄存器块的拧紧轴；脚本耗尽后重复最后一个寄存器块
struct ScriptedAxis {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Vec<u16>>,
    writes: Mutex<Vec<(u16, Vec<u16>)>>,
    block_reads: AtomicUsize,
    connected: AtomicBool,
}

impl ScriptedAxis {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(block(0, 0, 0.0)),
            writes: Mutex::new(Vec::new()),
            block_reads: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        })
    }

    fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegisterClient for ScriptedAxis {
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ProtocolError::NotConnected);
        }
        if count == 1 {
            return Ok(vec![self.last.lock().unwrap()[address as usize]]);
        }
        self.block_reads.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Block(words)) => {
                *self.last.lock().unwrap() = words.clone();
                Ok(words)
            }
            Some(Step::Fail) => Err(ProtocolError::Timeout("read".to_string())),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        self.writes.lock().unwrap().push((address, vec![value]));
        Ok(())
    }

    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), ProtocolError> {
        self.writes.lock().unwrap().push((address, values.to_vec()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::Connection("refused".to_string()))
    }
}

fn block(command: u16, status: u16, completed_torque: f32) -> Vec<u16> {
    let mut words = vec![0u16; 16];
    words[0] = command;
    words[1] = status;
    words[4..6].copy_from_slice(&encode_f32(completed_torque));
    words[8..10].copy_from_slice(&encode_f32(29.0));
    words[10..12].copy_from_slice(&encode_f32(28.0));
    words[12..14].copy_from_slice(&encode_f32(30.0));
    words
}

fn fast_config() -> AxisControllerConfig {
    AxisControllerConfig {
        poll_interval: Duration::from_millis(5),
        recovery_delay: Duration::from_millis(300),
        validate_on_init: false,
        max_operation_timeout: Duration::from_secs(2),
        reconnect_interval: Duration::from_millis(5),
        ..AxisControllerConfig::default()
    }
}

fn params() -> TighteningParams {
    TighteningParams {
        target_torque: 29.0,
        lower_limit: 28.0,
        upper_limit: 30.0,
    }
}

#[tokio::test]
async fn qualified_cycle_completes_on_third_sample() {
    let axis = ScriptedAxis::new(vec![
        Step::Block(block(100, 0, 0.0)),
        Step::Block(block(100, 0, 0.0)),
        Step::Block(block(0, 10, 29.1)),
    ]);
    let controller = TighteningAxisController::new(axis, fast_config());

    let first = controller.poll_once().await.expect("sample 1");
    assert!(!first.is_operation_completed());
    assert!(!first.is_qualified());
    let second = controller.poll_once().await.expect("sample 2");
    assert!(!second.is_operation_completed());
    assert_eq!(controller.completed_cycles(), 0);

    let third = controller.poll_once().await.expect("sample 3");
    assert!(third.is_operation_completed());
    assert!(third.is_qualified());
    assert_eq!(third.quality_result(), "Qualified");
    assert!((third.torque_achievement_rate() - 100.3448).abs() < 0.01);
    assert_eq!(controller.completed_cycles(), 1);
    assert!(matches!(controller.cycle_state(), CycleState::Completed(_)));

    // 轴停留在终态，不再重复宣告
    controller.poll_once().await.expect("sample 4");
    controller.poll_once().await.expect("sample 5");
    assert_eq!(controller.completed_cycles(), 1);
    assert_eq!(
        controller.current_sample().map(|s| s.running_status_code),
        Some(10)
    );
}

#[tokio::test]
async fn torque_too_low_completes_as_failure() {
    let axis = ScriptedAxis::new(vec![
        Step::Block(block(100, 0, 0.0)),
        Step::Block(block(0, 21, 27.5)),
    ]);
    let controller = TighteningAxisController::new(axis, fast_config());
    controller.poll_once().await.expect("sample 1");
    let last = controller.poll_once().await.expect("sample 2");

    assert!(last.is_operation_completed());
    assert!(!last.is_qualified());
    assert_eq!(last.status, TighteningStatus::TorqueTooLow);
    assert_eq!(last.quality_result(), "TorqueTooLow");
    assert!(last.failure_reason().is_some());
    assert_eq!(controller.completed_cycles(), 1);
}

#[tokio::test]
async fn idle_axis_never_declares_completion() {
    // 轴上电即停在上一周期的终态，控制器未启动过
    let axis = ScriptedAxis::new(vec![Step::Block(block(0, 10, 29.1))]);
    let controller = TighteningAxisController::new(axis, fast_config());
    for _ in 0..3 {
        controller.poll_once().await.expect("sample");
    }
    assert_eq!(controller.completed_cycles(), 0);
    assert_eq!(controller.cycle_state(), CycleState::Idle);
}

#[tokio::test]
async fn start_writes_params_then_command() {
    let axis = ScriptedAxis::new(vec![]);
    let controller = TighteningAxisController::new(axis.clone(), fast_config());
    controller.start(params()).await.expect("start");

    let writes = axis.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, 8);
    assert_eq!(writes[0].1.len(), 6);
    assert_eq!(writes[1], (0, vec![100]));
    assert!(matches!(controller.cycle_state(), CycleState::Started { .. }));

    controller.stop().await.expect("stop");
    assert_eq!(axis.writes().last(), Some(&(0, vec![0])));
    assert!(matches!(
        controller.wait_for_completion(Duration::from_millis(50)).await,
        Err(TighteningError::NoCycle)
    ));
}

#[tokio::test]
async fn stale_idle_block_after_start_is_not_a_completion() {
    let axis = ScriptedAxis::new(vec![
        Step::Block(block(0, 0, 0.0)),
        Step::Block(block(100, 3, 12.0)),
        Step::Block(block(0, 10, 29.1)),
    ]);
    let controller = TighteningAxisController::new(axis, fast_config());
    controller.start(params()).await.expect("start");

    let stale = controller.poll_once().await.expect("sample 1");
    assert!(!stale.is_operation_completed());
    assert_eq!(controller.completed_cycles(), 0);
    assert!(matches!(controller.cycle_state(), CycleState::Started { .. }));

    controller.poll_once().await.expect("sample 2");
    let done = controller.poll_once().await.expect("sample 3");
    assert!(done.is_operation_completed());
    assert_eq!(done.quality_result(), "Qualified");
    assert_eq!(controller.completed_cycles(), 1);
}

#[tokio::test]
async fn start_rejects_invalid_params() {
    let axis = ScriptedAxis::new(vec![]);
    let controller = TighteningAxisController::new(axis.clone(), fast_config());
    let bad = TighteningParams {
        target_torque: 35.0,
        ..params()
    };
    assert!(matches!(
        controller.start(bad).await,
        Err(TighteningError::InvalidParams(_))
    ));
    assert!(axis.writes().is_empty());
}

#[tokio::test]
async fn validation_gates_polling() {
    let axis = ScriptedAxis::new(vec![]);
    axis.connected.store(false, Ordering::SeqCst);
    let config = AxisControllerConfig {
        validate_on_init: true,
        ..fast_config()
    };
    let controller = TighteningAxisController::new(axis.clone(), config);
    assert!(!controller.is_polling_armed());
    assert!(matches!(
        controller.start(params()).await,
        Err(TighteningError::NotArmed)
    ));

    // 校验失败：run 直接返回，轮询未就绪
    let result = controller.run(CancellationToken::new()).await;
    assert!(matches!(result, Err(TighteningError::ValidationFailed(_))));
    assert!(!controller.is_polling_armed());
    assert_eq!(axis.block_reads.load(Ordering::SeqCst), 0);

    axis.connected.store(true, Ordering::SeqCst);
    controller.validate().await.expect("validate");
    assert!(controller.is_polling_armed());
    controller.start(params()).await.expect("start");
}

#[tokio::test]
async fn wait_for_completion_returns_completed_sample() {
    let axis = ScriptedAxis::new(vec![
        Step::Block(block(100, 3, 5.0)),
        Step::Block(block(100, 5, 20.0)),
        Step::Block(block(0, 10, 29.1)),
    ]);
    let controller = Arc::new(TighteningAxisController::new(axis, fast_config()));
    controller.start(params()).await.expect("start");

    let cancel = CancellationToken::new();
    let runner = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };

    let sample = controller
        .wait_for_completion(Duration::from_secs(5))
        .await
        .expect("completed");
    assert!(sample.is_qualified());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.completed_cycles(), 1);
    cancel.cancel();
    runner.await.expect("join").expect("run");
}

#[tokio::test]
async fn wait_for_completion_times_out_without_retry() {
    let axis = ScriptedAxis::new(vec![Step::Block(block(100, 3, 5.0))]);
    let config = AxisControllerConfig {
        max_operation_timeout: Duration::from_millis(60),
        ..fast_config()
    };
    let controller = Arc::new(TighteningAxisController::new(axis.clone(), config));
    controller.start(params()).await.expect("start");

    let cancel = CancellationToken::new();
    let runner = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };

    // 超时取 min(请求, 上限)
    let result = controller.wait_for_completion(Duration::from_secs(10)).await;
    assert!(matches!(
        result,
        Err(TighteningError::Timeout(limit)) if limit == Duration::from_millis(60)
    ));
    assert_eq!(controller.cycle_state(), CycleState::Idle);
    // 没有再次下发启动字
    let starts = axis
        .writes()
        .iter()
        .filter(|(addr, values)| *addr == 0 && values == &vec![100])
        .count();
    assert_eq!(starts, 1);

    cancel.cancel();
    runner.await.expect("join").expect("run");
}

#[tokio::test]
async fn consecutive_failures_pause_polling() {
    let axis = ScriptedAxis::new(vec![
        Step::Fail,
        Step::Fail,
        Step::Fail,
        Step::Block(block(0, 0, 0.0)),
    ]);
    let controller = Arc::new(TighteningAxisController::new(axis.clone(), fast_config()));
    let cancel = CancellationToken::new();
    let runner = {
        let controller = controller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { controller.run(cancel).await })
    };

    // 三次失败后进入 300ms 冷却
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(axis.block_reads.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(axis.block_reads.load(Ordering::SeqCst) > 3);
    assert!(controller.current_sample().is_some());

    cancel.cancel();
    runner.await.expect("join").expect("run");
}

#[tokio::test]
async fn reconnect_attempts_are_bounded() {
    let axis = ScriptedAxis::new(vec![]);
    axis.connected.store(false, Ordering::SeqCst);
    let config = AxisControllerConfig {
        max_reconnect_attempts: 2,
        ..fast_config()
    };
    let controller = TighteningAxisController::new(axis, config);
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        controller.run(CancellationToken::new()),
    )
    .await
    .expect("run returns");
    assert!(matches!(result, Err(TighteningError::ReconnectExhausted(2))));
    assert!(!controller.is_polling_armed());
}
