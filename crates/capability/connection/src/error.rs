use domain::DeviceKind;
use station_protocol::ProtocolError;

/// 连接编排错误。
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// 设备未配置端点
    #[error("device not configured: {0}")]
    NotConfigured(DeviceKind),
    /// 设备不支持该操作（例如向寄存器链路发送字节流）
    #[error("{operation} not supported by {device}")]
    Unsupported {
        device: DeviceKind,
        operation: &'static str,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
