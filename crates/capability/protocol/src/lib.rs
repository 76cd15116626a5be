//! # 传输链路能力模块
//!
//! 工位控制器与现场设备之间的传输层，提供：
//! - **Modbus TCP 寄存器链路**：PLC 握手寄存器、拧紧轴寄存器块
//! - **TCP Client 字节流链路**：条码枪、拧紧轴数据流
//! - **TCP Server 字节流链路**：等待线体上位机接入
//!
//! ## 架构设计
//!
//! ```text
//! ModbusRegisterLink ──┐ (RegisterClient)
//! TcpClientLink ───────┤
//! TcpServerLink ───────┘
//!       │
//!       ▼
//! ProtocolEventHandler (连接编排器)
//!       │
//!       ▼
//! StationEvent 广播
//! ```
//!
//! 链路本身不做重连，重连策略由上层决定。

mod error;
mod modbus_tcp;
mod register;
mod tcp_client;
mod tcp_server;
mod types;

pub use error::ProtocolError;
pub use modbus_tcp::{ModbusRegisterLink, ModbusTcpConfig};
pub use register::RegisterClient;
pub use tcp_client::{StreamReader, TcpClientConfig, TcpClientLink};
pub use tcp_server::{TcpServerConfig, TcpServerLink};
pub use types::*;
