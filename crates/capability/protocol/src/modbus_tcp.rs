//! Modbus TCP 寄存器链路
//!
//! 连接 Modbus 从设备（PLC、拧紧轴），提供带超时的单次寄存器读写。
//! 链路级故障（传输错误、连接断开）时链路自行标记为断开并通知处理器，
//! 不在链路内部重连。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = ModbusTcpConfig {
//!     host: "192.168.1.10".to_string(),
//!     port: 502,
//!     unit_id: 1,
//!     connect_timeout_ms: 3000,
//!     operation_timeout_ms: 1000,
//! };
//! let link = ModbusRegisterLink::new(DeviceKind::Plc, config).with_handler(handler);
//! link.connect().await?;
//! let trigger = link.read_register(0).await?;
//! ```

use crate::error::ProtocolError;
use crate::register::RegisterClient;
use crate::types::{ProtocolEvent, ProtocolEventHandler};
use async_trait::async_trait;
use domain::{CommunicationEndpoint, DeviceKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Modbus TCP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// Modbus 服务器主机地址
    pub host: String,
    /// Modbus 服务器端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 单次读写超时（毫秒）
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_operation_timeout() -> u64 {
    1000
}

impl ModbusTcpConfig {
    /// 从通信端点构造（端点超时同时用作连接与单次操作超时）
    pub fn from_endpoint(endpoint: &CommunicationEndpoint) -> Self {
        Self {
            host: endpoint.address.clone(),
            port: endpoint.port,
            unit_id: endpoint.station_id,
            connect_timeout_ms: endpoint.timeout_ms,
            operation_timeout_ms: endpoint.timeout_ms,
        }
    }
}

/// Modbus TCP 寄存器链路
pub struct ModbusRegisterLink {
    device: DeviceKind,
    config: ModbusTcpConfig,
    context: Mutex<Option<tokio_modbus::client::Context>>,
    connected: AtomicBool,
    handler: Option<Arc<dyn ProtocolEventHandler>>,
}

impl ModbusRegisterLink {
    /// 创建新的寄存器链路（未连接）
    pub fn new(device: DeviceKind, config: ModbusTcpConfig) -> Self {
        Self {
            device,
            config,
            context: Mutex::new(None),
            connected: AtomicBool::new(false),
            handler: None,
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(device: DeviceKind, json: &str) -> Result<Self, ProtocolError> {
        let config: ModbusTcpConfig =
            serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))?;
        Ok(Self::new(device, config))
    }

    /// 注册链路事件处理器（连接状态变化）
    pub fn with_handler(mut self, handler: Arc<dyn ProtocolEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    /// 建立连接（与超时计时器竞争）
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        info!(
            target: "station.protocol",
            device = %self.device,
            addr = %target,
            unit_id = self.config.unit_id,
            "modbus_connecting"
        );

        let attempt = async {
            let addr = tokio::net::lookup_host(&target)
                .await?
                .next()
                .ok_or_else(|| ProtocolError::ConfigParse(format!("invalid address: {}", target)))?;
            tcp::connect_slave(addr, Slave(self.config.unit_id))
                .await
                .map_err(|e| ProtocolError::Connection(e.to_string()))
        };

        let ctx = match timeout(connect_timeout, attempt).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(ProtocolError::Timeout(format!(
                    "connect to {} after {}ms",
                    target, self.config.connect_timeout_ms
                )));
            }
        };

        *self.context.lock().await = Some(ctx);
        self.connected.store(true, Ordering::SeqCst);
        info!(target: "station.protocol", device = %self.device, addr = %target, "modbus_connected");
        self.notify(true).await;
        Ok(())
    }

    /// 主动断开
    pub async fn disconnect(&self) {
        self.context.lock().await.take();
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(target: "station.protocol", device = %self.device, "modbus_disconnected");
            self.notify(false).await;
        }
    }

    fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.operation_timeout_ms)
    }

    /// 根据本次操作结果决定是否将链路标记为断开
    async fn settle<T>(
        &self,
        mut guard: MutexGuard<'_, Option<tokio_modbus::client::Context>>,
        result: Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        if let Err(err) = &result {
            if err.is_link_fault() {
                guard.take();
                drop(guard);
                if self.connected.swap(false, Ordering::SeqCst) {
                    warn!(
                        target: "station.protocol",
                        device = %self.device,
                        error = %err,
                        "modbus_link_fault"
                    );
                    self.notify(false).await;
                }
            }
        }
        result
    }

    async fn notify(&self, connected: bool) {
        let Some(handler) = &self.handler else {
            return;
        };
        let event = ProtocolEvent::ConnectionChanged {
            device: self.device,
            connected,
        };
        if let Err(e) = handler.handle(event).await {
            warn!(
                target: "station.protocol",
                device = %self.device,
                error = %e,
                "failed to handle protocol event"
            );
        }
    }
}

/// 展开 “超时 / 传输错误 / 异常响应 / 结果” 四层结果
fn flatten<T, E: Display, X: Debug>(
    result: Result<Result<Result<T, X>, E>, Elapsed>,
    operation: &str,
) -> Result<T, ProtocolError> {
    match result {
        Err(_) => Err(ProtocolError::Timeout(operation.to_string())),
        Ok(Err(e)) => Err(ProtocolError::Transport(e.to_string())),
        Ok(Ok(Err(exception))) => Err(ProtocolError::Modbus(format!("exception: {:?}", exception))),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

#[async_trait]
impl RegisterClient for ModbusRegisterLink {
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let result = flatten(
            timeout(
                self.operation_timeout(),
                ctx.read_holding_registers(address, count),
            )
            .await,
            "read_holding_registers",
        );
        if let Ok(values) = &result {
            debug!(
                device = %self.device,
                register = address,
                count = count,
                values = ?values,
                "read modbus registers"
            );
        }
        self.settle(guard, result).await
    }

    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let result = flatten(
            timeout(
                self.operation_timeout(),
                ctx.write_single_register(address, value),
            )
            .await,
            "write_single_register",
        );
        self.settle(guard, result).await
    }

    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), ProtocolError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let result = flatten(
            timeout(
                self.operation_timeout(),
                ctx.write_multiple_registers(address, values),
            )
            .await,
            "write_multiple_registers",
        );
        self.settle(guard, result).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), ProtocolError> {
        self.context.lock().await.take();
        self.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{"host": "192.168.1.100", "port": 502, "unit_id": 3}"#;
        let link = ModbusRegisterLink::from_json(DeviceKind::Plc, json).unwrap();
        assert_eq!(link.config().host, "192.168.1.100");
        assert_eq!(link.config().port, 502);
        assert_eq!(link.config().unit_id, 3);
        assert_eq!(link.config().operation_timeout_ms, 1000);
    }

    #[test]
    fn test_config_from_endpoint() {
        let mut endpoint = CommunicationEndpoint::new("10.0.0.5", 1502);
        endpoint.station_id = 7;
        endpoint.timeout_ms = 800;
        let config = ModbusTcpConfig::from_endpoint(&endpoint);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 1502);
        assert_eq!(config.unit_id, 7);
        assert_eq!(config.connect_timeout_ms, 800);
    }

    #[tokio::test]
    async fn test_operations_fail_fast_when_disconnected() {
        let link = ModbusRegisterLink::new(
            DeviceKind::Plc,
            ModbusTcpConfig::from_endpoint(&CommunicationEndpoint::new("127.0.0.1", 502)),
        );
        assert!(!link.is_connected());
        let err = link.read_register(0).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
        let err = link.write_register(4, 1).await.unwrap_err();
        assert!(err.is_link_fault());
    }

    #[tokio::test]
    async fn test_connect_refused_reports_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let mut endpoint = CommunicationEndpoint::new("127.0.0.1", port);
        endpoint.timeout_ms = 500;
        let link = ModbusRegisterLink::new(DeviceKind::Plc, ModbusTcpConfig::from_endpoint(&endpoint));
        assert!(link.connect().await.is_err());
        assert!(!link.is_connected());
    }
}
