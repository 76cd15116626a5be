//! 设备连接编排
//!
//! PLC 走 Modbus 寄存器链路，条码枪和拧紧轴数据流是 TCP 客户端，
//! 线体上位机由本机监听等待接入。`connect_all` 并行建连，PLC 连上即视为初始化成功；
//! 字节流设备各自一条接收循环，收到的数据和连通性变化经 [`ConnectionHub`] 广播。
//! 断线只记录状态，不在这里自动重连。

use crate::error::ConnectionError;
use crate::hub::ConnectionHub;
use crate::link::RegisterLink;
use domain::{CommunicationEndpoint, DeviceConnectionState, DeviceKind};
use station_protocol::{
    ModbusRegisterLink, ModbusTcpConfig, ProtocolEvent, RegisterClient, StreamReader,
    TcpClientConfig, TcpClientLink, TcpServerConfig, TcpServerLink,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 256;

/// 四路设备的通信端点；可选设备未配置时为 None。
#[derive(Debug, Clone)]
pub struct StationEndpoints {
    pub plc: CommunicationEndpoint,
    pub scanner: Option<CommunicationEndpoint>,
    pub tightening_axis: Option<CommunicationEndpoint>,
    pub line_pc: Option<CommunicationEndpoint>,
}

/// 字节流链路集合。
#[derive(Default)]
pub struct StreamLinks {
    pub scanner: Option<Arc<TcpClientLink>>,
    pub tightening_axis: Option<Arc<TcpClientLink>>,
    pub line_pc: Option<Arc<TcpServerLink>>,
}

/// `connect_all` 的逐设备结果（None 表示未配置）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReport {
    pub plc: bool,
    pub scanner: Option<bool>,
    pub tightening_axis: Option<bool>,
    pub line_pc: Option<bool>,
}

impl ConnectReport {
    /// 初始化成功当且仅当 PLC 连上。
    pub fn initialized(&self) -> bool {
        self.plc
    }

    pub fn get(&self, device: DeviceKind) -> Option<bool> {
        match device {
            DeviceKind::Plc => Some(self.plc),
            DeviceKind::Scanner => self.scanner,
            DeviceKind::TighteningAxis => self.tightening_axis,
            DeviceKind::LinePc => self.line_pc,
        }
    }
}

/// 设备连接编排器
///
/// 持有四路链路，负责并行建连、为字节流设备启动接收循环、发布连接状态。
/// 编排器本身不自动重连。
pub struct DeviceOrchestrator {
    hub: Arc<ConnectionHub>,
    plc: Arc<dyn RegisterLink>,
    plc_client: Arc<dyn RegisterClient>,
    scanner: Option<Arc<TcpClientLink>>,
    axis_stream: Option<Arc<TcpClientLink>>,
    line_pc: Option<Arc<TcpServerLink>>,
    line_pc_addr: Mutex<Option<SocketAddr>>,
    cancel: CancellationToken,
    device_tokens: Mutex<HashMap<DeviceKind, CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceOrchestrator {
    /// 按端点构建真实链路（PLC 走 Modbus TCP，其余走 TCP 字节流）。
    pub fn new(endpoints: &StationEndpoints) -> Self {
        let hub = Arc::new(ConnectionHub::new(EVENT_CAPACITY));
        let plc = Arc::new(
            ModbusRegisterLink::new(
                DeviceKind::Plc,
                ModbusTcpConfig::from_endpoint(&endpoints.plc),
            )
            .with_handler(hub.clone()),
        );
        let client = |device: DeviceKind, endpoint: &Option<CommunicationEndpoint>| {
            endpoint.as_ref().map(|endpoint| {
                Arc::new(TcpClientLink::new(
                    device,
                    TcpClientConfig::from_endpoint(endpoint),
                ))
            })
        };
        let streams = StreamLinks {
            scanner: client(DeviceKind::Scanner, &endpoints.scanner),
            tightening_axis: client(DeviceKind::TighteningAxis, &endpoints.tightening_axis),
            line_pc: endpoints.line_pc.as_ref().map(|endpoint| {
                Arc::new(TcpServerLink::new(
                    DeviceKind::LinePc,
                    TcpServerConfig::from_endpoint(endpoint),
                ))
            }),
        };
        Self::from_parts(hub, plc, streams)
    }

    /// 由现成链路组装（测试中可替换 PLC 链路）。
    pub fn from_parts<L>(hub: Arc<ConnectionHub>, plc: Arc<L>, streams: StreamLinks) -> Self
    where
        L: RegisterLink + 'static,
    {
        let plc_client: Arc<dyn RegisterClient> = plc.clone();
        Self {
            hub,
            plc,
            plc_client,
            scanner: streams.scanner,
            axis_stream: streams.tightening_axis,
            line_pc: streams.line_pc,
            line_pc_addr: Mutex::new(None),
            cancel: CancellationToken::new(),
            device_tokens: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// PLC 寄存器链路（握手状态机使用）。
    pub fn plc(&self) -> Arc<dyn RegisterClient> {
        self.plc_client.clone()
    }

    pub fn is_configured(&self, device: DeviceKind) -> bool {
        match device {
            DeviceKind::Plc => true,
            DeviceKind::Scanner => self.scanner.is_some(),
            DeviceKind::TighteningAxis => self.axis_stream.is_some(),
            DeviceKind::LinePc => self.line_pc.is_some(),
        }
    }

    pub fn is_connected(&self, device: DeviceKind) -> bool {
        self.hub.state(device).is_connected()
    }

    pub fn state(&self, device: DeviceKind) -> DeviceConnectionState {
        self.hub.state(device)
    }

    /// 全部设备的状态快照。
    pub fn states(&self) -> Vec<(DeviceKind, DeviceConnectionState)> {
        DeviceKind::ALL
            .iter()
            .map(|device| (*device, self.hub.state(*device)))
            .collect()
    }

    pub fn watch_state(&self, device: DeviceKind) -> Option<watch::Receiver<DeviceConnectionState>> {
        self.hub.watch(device)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.hub.subscribe()
    }

    /// 线体上位机监听的实际地址（绑定成功后可用）。
    pub fn line_pc_addr(&self) -> Option<SocketAddr> {
        *lock(&self.line_pc_addr)
    }

    /// 并行连接全部已配置设备。
    pub async fn connect_all(&self) -> ConnectReport {
        let (plc, scanner, tightening_axis, line_pc) = tokio::join!(
            self.connect_plc(),
            self.connect_client(DeviceKind::Scanner),
            self.connect_client(DeviceKind::TighteningAxis),
            self.start_line_pc(),
        );
        let report = ConnectReport {
            plc,
            scanner,
            tightening_axis,
            line_pc,
        };
        if report.initialized() {
            info!(
                target: "station.connection",
                scanner = ?report.scanner,
                tightening_axis = ?report.tightening_axis,
                line_pc = ?report.line_pc,
                "orchestrator_initialized"
            );
        } else {
            warn!(target: "station.connection", "orchestrator_init_failed_plc_unavailable");
        }
        report
    }

    async fn connect_plc(&self) -> bool {
        if self.is_connected(DeviceKind::Plc) {
            return true;
        }
        self.hub
            .set_state(DeviceKind::Plc, DeviceConnectionState::Connecting);
        match self.plc.connect().await {
            Ok(()) => {
                self.hub
                    .set_state(DeviceKind::Plc, DeviceConnectionState::Connected);
                true
            }
            Err(err) => {
                warn!(target: "station.connection", device = %DeviceKind::Plc, error = %err, "device_connect_failed");
                self.hub
                    .set_state(DeviceKind::Plc, DeviceConnectionState::Faulted);
                false
            }
        }
    }

    fn client_link(&self, device: DeviceKind) -> Option<&Arc<TcpClientLink>> {
        match device {
            DeviceKind::Scanner => self.scanner.as_ref(),
            DeviceKind::TighteningAxis => self.axis_stream.as_ref(),
            _ => None,
        }
    }

    async fn connect_client(&self, device: DeviceKind) -> Option<bool> {
        let link = self.client_link(device)?.clone();
        if self.is_connected(device) {
            return Some(true);
        }
        self.hub.set_state(device, DeviceConnectionState::Connecting);
        match link.connect().await {
            Ok(reader) => {
                self.hub.set_state(device, DeviceConnectionState::Connected);
                let token = self.device_token(device);
                let hub = self.hub.clone();
                self.spawn(async move {
                    if let Some(state) = receive_loop(&hub, device, reader, &token).await {
                        link.disconnect().await;
                        hub.set_state(device, state);
                    }
                });
                Some(true)
            }
            Err(err) => {
                warn!(target: "station.connection", device = %device, error = %err, "device_connect_failed");
                self.hub.set_state(device, DeviceConnectionState::Faulted);
                Some(false)
            }
        }
    }

    /// 线体上位机：绑定成功即视为就绪，对端接入后才算已连接。
    async fn start_line_pc(&self) -> Option<bool> {
        let server = self.line_pc.clone()?;
        if self.line_pc_addr().is_some() {
            return Some(true);
        }
        match server.bind().await {
            Ok(addr) => {
                *lock(&self.line_pc_addr) = Some(addr);
                self.hub
                    .set_state(DeviceKind::LinePc, DeviceConnectionState::Connecting);
                let token = self.device_token(DeviceKind::LinePc);
                let hub = self.hub.clone();
                self.spawn(accept_loop(hub, server, token));
                Some(true)
            }
            Err(err) => {
                warn!(target: "station.connection", device = %DeviceKind::LinePc, error = %err, "device_connect_failed");
                self.hub
                    .set_state(DeviceKind::LinePc, DeviceConnectionState::Faulted);
                Some(false)
            }
        }
    }

    /// 主动断开单个设备并停止其接收循环。
    pub async fn disconnect(&self, device: DeviceKind) {
        self.cancel_device(device);
        self.hub
            .set_state(device, DeviceConnectionState::Disconnected);
        match device {
            DeviceKind::Plc => self.plc.disconnect().await,
            DeviceKind::Scanner | DeviceKind::TighteningAxis => {
                if let Some(link) = self.client_link(device) {
                    link.disconnect().await;
                }
            }
            DeviceKind::LinePc => {
                if let Some(server) = &self.line_pc {
                    server.unbind().await;
                }
                lock(&self.line_pc_addr).take();
            }
        }
    }

    /// 向字节流设备发送数据。
    pub async fn send(&self, device: DeviceKind, bytes: &[u8]) -> Result<(), ConnectionError> {
        let result = match device {
            DeviceKind::Plc => {
                return Err(ConnectionError::Unsupported {
                    device,
                    operation: "send",
                });
            }
            DeviceKind::Scanner | DeviceKind::TighteningAxis => {
                let link = self
                    .client_link(device)
                    .ok_or(ConnectionError::NotConfigured(device))?;
                let result = link.send(bytes).await;
                if let Err(err) = &result {
                    if err.is_link_fault() {
                        self.cancel_device(device);
                        self.hub.mark_lost(device);
                    }
                }
                result
            }
            DeviceKind::LinePc => {
                let server = self
                    .line_pc
                    .as_ref()
                    .ok_or(ConnectionError::NotConfigured(device))?;
                server.send(bytes).await
            }
        };
        Ok(result?)
    }

    /// 正常停止：通知全部循环退出并等待，再断开链路。
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        for device in DeviceKind::ALL {
            self.disconnect(device).await;
        }
        info!(target: "station.connection", "orchestrator_shutdown");
    }

    /// 急停：直接中止全部循环并丢弃链路，不等待循环收尾。
    pub async fn abort_all(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        for device in DeviceKind::ALL {
            self.disconnect(device).await;
        }
        warn!(target: "station.connection", aborted = handles.len(), "orchestrator_aborted");
    }

    fn device_token(&self, device: DeviceKind) -> CancellationToken {
        let token = self.cancel.child_token();
        if let Some(previous) = lock(&self.device_tokens).insert(device, token.clone()) {
            previous.cancel();
        }
        token
    }

    fn cancel_device(&self, device: DeviceKind) {
        if let Some(token) = lock(&self.device_tokens).remove(&device) {
            token.cancel();
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|handle| !handle.is_finished());
        tasks.push(tokio::spawn(task));
    }
}

/// 字节流接收循环；被取消时返回 None，否则返回结束后的设备状态。
async fn receive_loop(
    hub: &ConnectionHub,
    device: DeviceKind,
    mut reader: StreamReader,
    cancel: &CancellationToken,
) -> Option<DeviceConnectionState> {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return None,
            received = reader.receive() => received,
        };
        match received {
            Ok(Some(bytes)) => hub.publish_data(device, bytes),
            Ok(None) => {
                info!(target: "station.connection", device = %device, "stream_closed_by_peer");
                return Some(DeviceConnectionState::Disconnected);
            }
            Err(err) => {
                warn!(target: "station.connection", device = %device, error = %err, "stream_receive_failed");
                return Some(DeviceConnectionState::Faulted);
            }
        }
    }
}

/// 线体上位机接入循环：同一时间服务一个对端，对端断开后继续监听。
async fn accept_loop(hub: Arc<ConnectionHub>, server: Arc<TcpServerLink>, cancel: CancellationToken) {
    let device = DeviceKind::LinePc;
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = server.accept() => accepted,
        };
        match accepted {
            Ok((reader, peer)) => {
                info!(target: "station.connection", device = %device, peer = %peer, "line_pc_attached");
                hub.set_state(device, DeviceConnectionState::Connected);
                let ended = receive_loop(&hub, device, reader, &cancel).await;
                server.close_peer().await;
                if ended.is_none() {
                    break;
                }
                hub.set_state(device, DeviceConnectionState::Connecting);
            }
            Err(err) => {
                warn!(target: "station.connection", device = %device, error = %err, "line_pc_accept_failed");
                hub.set_state(device, DeviceConnectionState::Faulted);
                break;
            }
        }
    }
}
