//! 设备与连接状态定义。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 工位上的四类设备。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// PLC（寄存器链路，必选设备）
    Plc,
    /// 条码枪（字节流链路）
    Scanner,
    /// 拧紧轴（字节流链路）
    TighteningAxis,
    /// 线体上位机（服务端监听，接受其连接）
    LinePc,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::Plc,
        DeviceKind::Scanner,
        DeviceKind::TighteningAxis,
        DeviceKind::LinePc,
    ];

    /// 对外展示用的设备名（事件、日志、状态接口保持一致）。
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Plc => "PLC",
            DeviceKind::Scanner => "Scanner",
            DeviceKind::TighteningAxis => "TighteningAxis",
            DeviceKind::LinePc => "LinePC",
        }
    }

    /// 是否为字节流设备（连接成功后需要独立接收循环）。
    pub fn is_stream(&self) -> bool {
        !matches!(self, DeviceKind::Plc)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个设备的连接状态。
///
/// 仅由连接编排器写入，其余模块通过快照读取。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

impl DeviceConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceConnectionState::Connected)
    }
}

/// 设备通信端点（启动时的不可变快照）。
///
/// 配置变更需要重建编排器，运行中的链路不做热更新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationEndpoint {
    /// 设备地址（TCP Server 场景为监听地址）
    pub address: String,
    pub port: u16,
    /// 协议相关的站号（Modbus unit id），字节流设备忽略
    #[serde(default = "default_station_id")]
    pub station_id: u8,
    /// 连接与单次操作超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 接收缓冲区大小（字节）
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_station_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_buffer_size() -> usize {
    4096
}

impl CommunicationEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            station_id: default_station_id(),
            timeout_ms: default_timeout_ms(),
            buffer_size: default_buffer_size(),
        }
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
