//! 工位会话：按配置装配设备链路与后台任务，负责启动、停止与急停。

use crate::events::{EventRouter, log_station_events, write_stage_frames};
use async_trait::async_trait;
use domain::{
    CommunicationEndpoint, DeviceConnectionState, DeviceKind, StationEvent, TighteningAxisSample,
};
use station_config::StationConfig;
use station_connection::{ConnectReport, DeviceOrchestrator, StationEndpoints};
use station_handshake::{
    AxisTighteningDriver, HandshakeConfig, HandshakeError, HandshakeState, Heartbeat,
    PlcHandshake, PlcRegisterMap, TighteningDriver, scan_channel,
};
use station_pipeline::{Aggregator, AggregatorError, AggregatorStats};
use station_protocol::{ModbusRegisterLink, ModbusTcpConfig};
use station_tightening::{
    AxisControllerConfig, AxisRegisterMap, TighteningAxisController, TighteningError,
    TighteningParams,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("system is already running")]
    AlreadyRunning,
    #[error("system is not running")]
    NotRunning,
    /// 初始化失败：PLC 未连上
    #[error("plc connection failed")]
    PlcUnavailable(ConnectReport),
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
}

/// 单个设备的状态快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub device: DeviceKind,
    pub state: DeviceConnectionState,
    pub configured: bool,
}

/// 工位状态快照。
#[derive(Debug, Clone)]
pub struct StationSnapshot {
    pub running: bool,
    pub handshake_state: HandshakeState,
    pub current_barcode: Option<String>,
    pub devices: Vec<DeviceSnapshot>,
    pub current_sample: Option<TighteningAxisSample>,
    pub stats: AggregatorStats,
}

struct StationRuntime {
    orchestrator: Arc<DeviceOrchestrator>,
    handshake: Arc<PlcHandshake>,
    controller: Option<Arc<TighteningAxisController>>,
    axis_link: Option<Arc<ModbusRegisterLink>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct StationSession {
    config: StationConfig,
    aggregator: Aggregator,
    events: broadcast::Sender<StationEvent>,
    runtime: Mutex<Option<StationRuntime>>,
}

impl StationSession {
    /// `aggregator` 应已通过 `with_events` 接到同一个事件通道。
    pub fn new(
        config: StationConfig,
        aggregator: Aggregator,
        events: broadcast::Sender<StationEvent>,
    ) -> Self {
        Self {
            config,
            aggregator,
            events,
            runtime: Mutex::new(None),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    /// 建连并启动全部后台任务；PLC 未连上时整体失败并释放已建链路。
    pub async fn start_system(&self) -> Result<ConnectReport, SessionError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(log_station_events(
            self.events.subscribe(),
            cancel.clone(),
        )));

        let orchestrator = Arc::new(DeviceOrchestrator::new(&station_endpoints(&self.config)));
        let (scan_tx, scan_rx) = scan_channel();
        let (stage_tx, stage_rx) = mpsc::unbounded_channel();
        tasks.push(tokio::spawn(write_stage_frames(
            self.aggregator.clone(),
            stage_rx,
            cancel.clone(),
        )));
        let router = EventRouter::new(
            self.events.clone(),
            scan_tx,
            stage_tx,
            self.config.buffer_size,
            self.config.line_pc_max_frame_bytes,
        );
        tasks.push(tokio::spawn(
            router.run(orchestrator.subscribe(), cancel.clone()),
        ));

        let report = orchestrator.connect_all().await;
        if !report.initialized() {
            warn!(target: "station.api", report = ?report, "system_start_failed");
            cancel.cancel();
            orchestrator.shutdown().await;
            for task in tasks {
                let _ = task.await;
            }
            return Err(SessionError::PlcUnavailable(report));
        }

        let (controller, axis_link) = match self.start_axis(&cancel, &mut tasks).await {
            Some((controller, link)) => (Some(controller), Some(link)),
            None => (None, None),
        };
        let driver: Arc<dyn TighteningDriver> = match &controller {
            Some(controller) => Arc::new(AxisTighteningDriver::new(
                controller.clone(),
                tightening_params(&self.config),
                Duration::from_secs(self.config.axis_max_operation_timeout_seconds),
            )),
            None => Arc::new(MissingAxisDriver),
        };

        let handshake_config = handshake_config(&self.config);
        let heartbeat = Heartbeat::new(
            orchestrator.plc(),
            handshake_config.registers.heartbeat,
            handshake_config.poll_interval,
        );
        let handshake = Arc::new(
            PlcHandshake::new(
                orchestrator.plc(),
                driver,
                Arc::new(self.aggregator.clone()),
                handshake_config,
            )
            .with_events(self.events.clone()),
        );
        {
            let handshake = handshake.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                handshake.run(scan_rx, cancel).await;
            }));
        }
        {
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { heartbeat.run(cancel).await }));
        }
        {
            let aggregator = self.aggregator.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                aggregator.run_retry_loop(cancel).await;
            }));
        }

        info!(target: "station.api", report = ?report, "system_started");
        *runtime = Some(StationRuntime {
            orchestrator,
            handshake,
            controller,
            axis_link,
            cancel,
            tasks,
        });
        Ok(report)
    }

    /// 拧紧轴寄存器链路：独立的 Modbus 连接，轮询任务自带重连。
    async fn start_axis(
        &self,
        cancel: &CancellationToken,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Option<(Arc<TighteningAxisController>, Arc<ModbusRegisterLink>)> {
        let host = self.config.axis_host.clone()?;
        let link = Arc::new(ModbusRegisterLink::new(
            DeviceKind::TighteningAxis,
            ModbusTcpConfig {
                host,
                port: self.config.axis_register_port,
                unit_id: self.config.axis_unit_id,
                connect_timeout_ms: self.config.connect_timeout_ms,
                operation_timeout_ms: self.config.operation_timeout_ms,
            },
        ));
        if let Err(err) = link.connect().await {
            warn!(target: "station.api", error = %err, "axis_register_link_unavailable");
        }
        let controller = Arc::new(TighteningAxisController::new(
            link.clone(),
            axis_controller_config(&self.config),
        ));
        {
            let controller = controller.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = controller.run(cancel).await {
                    warn!(target: "station.api", error = %err, "axis_polling_exited");
                }
            }));
        }
        Some((controller, link))
    }

    /// 有序停止：取消所有循环，等待退出后断开链路。
    pub async fn stop_system(&self) -> Result<(), SessionError> {
        let runtime = self
            .runtime
            .lock()
            .await
            .take()
            .ok_or(SessionError::NotRunning)?;
        runtime.cancel.cancel();
        if let Some(controller) = &runtime.controller {
            if controller.is_link_connected() {
                if let Err(err) = controller.stop().await {
                    warn!(target: "station.api", error = %err, "axis_stop_failed");
                }
            }
        }
        for mut task in runtime.tasks {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!(target: "station.api", "task_stop_timeout");
                task.abort();
            }
        }
        runtime.orchestrator.shutdown().await;
        if let Some(link) = runtime.axis_link {
            link.disconnect().await;
        }
        info!(target: "station.api", "system_stopped");
        Ok(())
    }

    /// 急停：立即中止任务并丢弃全部链路，不等待当前周期。
    pub async fn emergency_stop(&self) -> Result<(), SessionError> {
        let runtime = self
            .runtime
            .lock()
            .await
            .take()
            .ok_or(SessionError::NotRunning)?;
        runtime.cancel.cancel();
        for task in &runtime.tasks {
            task.abort();
        }
        runtime.orchestrator.abort_all().await;
        if let Some(link) = runtime.axis_link {
            link.disconnect().await;
        }
        warn!(target: "station.api", "system_emergency_stopped");
        Ok(())
    }

    pub async fn status(&self) -> Result<StationSnapshot, SessionError> {
        let stats = self.aggregator.stats().await?;
        let runtime = self.runtime.lock().await;
        let snapshot = match runtime.as_ref() {
            Some(runtime) => StationSnapshot {
                running: true,
                handshake_state: runtime.handshake.state(),
                current_barcode: runtime.handshake.current_barcode(),
                devices: runtime
                    .orchestrator
                    .states()
                    .into_iter()
                    .map(|(device, state)| DeviceSnapshot {
                        device,
                        state,
                        configured: runtime.orchestrator.is_configured(device),
                    })
                    .collect(),
                current_sample: runtime
                    .controller
                    .as_ref()
                    .and_then(|controller| controller.current_sample()),
                stats,
            },
            None => StationSnapshot {
                running: false,
                handshake_state: HandshakeState::Idle,
                current_barcode: None,
                devices: DeviceKind::ALL
                    .into_iter()
                    .map(|device| DeviceSnapshot {
                        device,
                        state: DeviceConnectionState::Disconnected,
                        configured: is_configured(&self.config, device),
                    })
                    .collect(),
                current_sample: None,
                stats,
            },
        };
        Ok(snapshot)
    }
}

/// 未配置拧紧轴时的驱动：每次触发都以失败收场，握手写 NG。
struct MissingAxisDriver;

#[async_trait]
impl TighteningDriver for MissingAxisDriver {
    async fn tighten(&self) -> Result<TighteningAxisSample, HandshakeError> {
        Err(HandshakeError::Tightening(TighteningError::NotArmed))
    }
}

fn is_configured(config: &StationConfig, device: DeviceKind) -> bool {
    match device {
        DeviceKind::Plc => true,
        DeviceKind::Scanner => config.scanner_configured(),
        DeviceKind::TighteningAxis => config.axis_configured(),
        DeviceKind::LinePc => config.line_pc_listen_port.is_some(),
    }
}

fn endpoint(config: &StationConfig, address: &str, port: u16, station_id: u8) -> CommunicationEndpoint {
    CommunicationEndpoint {
        station_id,
        timeout_ms: config.connect_timeout_ms,
        buffer_size: config.buffer_size,
        ..CommunicationEndpoint::new(address, port)
    }
}

pub fn station_endpoints(config: &StationConfig) -> StationEndpoints {
    let stream = |host: &Option<String>, port: Option<u16>| match (host, port) {
        (Some(host), Some(port)) => Some(endpoint(config, host, port, 1)),
        _ => None,
    };
    StationEndpoints {
        plc: endpoint(config, &config.plc_host, config.plc_port, config.plc_unit_id),
        scanner: stream(&config.scanner_host, config.scanner_port),
        tightening_axis: stream(&config.axis_host, config.axis_port),
        line_pc: config
            .line_pc_listen_port
            .map(|port| endpoint(config, &config.line_pc_listen_addr, port, 1)),
    }
}

pub fn handshake_config(config: &StationConfig) -> HandshakeConfig {
    HandshakeConfig {
        registers: PlcRegisterMap {
            scan_trigger: config.plc_reg_scan_trigger,
            tightening_trigger: config.plc_reg_tightening_trigger,
            scan_result: config.plc_reg_scan_result,
            tightening_result: config.plc_reg_tightening_result,
            heartbeat: config.plc_reg_heartbeat,
        },
        poll_interval: Duration::from_millis(config.plc_poll_interval_ms),
        scan_timeout: Duration::from_millis(config.scan_timeout_ms),
    }
}

pub fn axis_controller_config(config: &StationConfig) -> AxisControllerConfig {
    AxisControllerConfig {
        register_map: AxisRegisterMap::new(config.axis_reg_base),
        poll_interval: Duration::from_millis(config.axis_poll_interval_ms),
        failure_threshold: config.axis_failure_threshold,
        recovery_delay: Duration::from_millis(config.axis_recovery_delay_ms),
        validate_on_init: config.axis_validate_on_init,
        max_operation_timeout: Duration::from_secs(config.axis_max_operation_timeout_seconds),
        max_reconnect_attempts: config.axis_max_reconnect_attempts,
        reconnect_interval: Duration::from_secs(config.reconnect_interval_seconds),
    }
}

fn tightening_params(config: &StationConfig) -> TighteningParams {
    TighteningParams {
        target_torque: config.target_torque,
        lower_limit: config.torque_lower_limit,
        upper_limit: config.torque_upper_limit,
    }
}
