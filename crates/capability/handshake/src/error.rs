use station_protocol::ProtocolError;
use station_tightening::TighteningError;

/// 握手错误。
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Tightening(#[from] TighteningError),
    /// PLC 链路在周期中途断开，本周期放弃
    #[error("plc link lost, cycle abandoned")]
    PlcLost,
    /// 生产记录写入失败
    #[error("recording failed: {0}")]
    Recording(String),
    #[error("handshake stopped")]
    Stopped,
}
