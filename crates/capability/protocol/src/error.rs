//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Modbus 异常响应（设备在线，但拒绝了请求）
    #[error("modbus error: {0}")]
    Modbus(String),

    /// Modbus 传输层错误
    #[error("transport error: {0}")]
    Transport(String),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// 数据解析错误
    #[error("data parse error: {0}")]
    DataParse(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 链路未连接
    #[error("link not connected")]
    NotConnected,

    /// 链路不支持该操作
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// 通道关闭
    #[error("channel closed")]
    ChannelClosed,
}

impl ProtocolError {
    /// 是否为链路级故障（链路需标记为断开）。
    ///
    /// 超时与 Modbus 异常只影响本次操作，调用方在下一拍重试。
    pub fn is_link_fault(&self) -> bool {
        matches!(
            self,
            ProtocolError::Connection(_)
                | ProtocolError::Io(_)
                | ProtocolError::Transport(_)
                | ProtocolError::NotConnected
                | ProtocolError::ChannelClosed
        )
    }
}
