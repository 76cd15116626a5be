//! 拧紧轴控制错误类型

use station_protocol::ProtocolError;
use std::time::Duration;

/// 拧紧轴控制错误
#[derive(Debug, thiserror::Error)]
pub enum TighteningError {
    /// 寄存器链路错误
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 拧紧参数不合法
    #[error("invalid tightening params: {0}")]
    InvalidParams(String),

    /// 轮询未就绪（初始化校验失败或重连耗尽）
    #[error("axis polling not armed")]
    NotArmed,

    /// 初始化校验读取失败
    #[error("axis validation failed: {0}")]
    ValidationFailed(String),

    /// 重连次数耗尽
    #[error("axis reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    /// 当前没有进行中的拧紧周期
    #[error("no tightening cycle in flight")]
    NoCycle,

    /// 周期被停止
    #[error("tightening cycle stopped")]
    Stopped,

    /// 等待完成超时
    #[error("tightening timed out after {0:?}")]
    Timeout(Duration),
}
