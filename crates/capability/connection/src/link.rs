//! PLC 寄存器链路的生命周期接口

use async_trait::async_trait;
use station_protocol::{ModbusRegisterLink, ProtocolError, RegisterClient};

/// 可由编排器建连/断开的寄存器链路。
#[async_trait]
pub trait RegisterLink: RegisterClient {
    async fn connect(&self) -> Result<(), ProtocolError>;

    async fn disconnect(&self);
}

#[async_trait]
impl RegisterLink for ModbusRegisterLink {
    async fn connect(&self) -> Result<(), ProtocolError> {
        ModbusRegisterLink::connect(self).await
    }

    async fn disconnect(&self) {
        ModbusRegisterLink::disconnect(self).await
    }
}
