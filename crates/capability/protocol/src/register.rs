//! 寄存器链路抽象
//!
//! PLC 握手与拧紧轴控制只依赖该接口，便于替换为内存实现做测试。

use crate::error::ProtocolError;
use async_trait::async_trait;

/// 寄存器读写接口（一次只允许一个未完成请求）
#[async_trait]
pub trait RegisterClient: Send + Sync {
    /// 读保持寄存器
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError>;

    /// 写单个寄存器
    async fn write_register(&self, address: u16, value: u16) -> Result<(), ProtocolError>;

    /// 写多个连续寄存器
    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), ProtocolError>;

    /// 链路当前是否可用
    fn is_connected(&self) -> bool;

    /// 重新建立链路（不支持重连的实现返回 `Unsupported`）
    async fn reconnect(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::Unsupported("reconnect".to_string()))
    }

    /// 读单个寄存器
    async fn read_register(&self, address: u16) -> Result<u16, ProtocolError> {
        let values = self.read_holding_registers(address, 1).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| ProtocolError::DataParse("empty registers".to_string()))
    }
}
