//! TCP 客户端字节流链路
//!
//! 主动连接设备（条码枪、拧紧轴），连接成功后拆分读写两端：
//! 写端由链路持有用于发送，读端交给调用方的接收循环。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let link = TcpClientLink::new(DeviceKind::Scanner, TcpClientConfig::from_endpoint(&endpoint));
//! let mut reader = link.connect().await?;
//! while let Some(bytes) = reader.receive().await? {
//!     // ...
//! }
//! ```

use crate::error::ProtocolError;
use domain::{CommunicationEndpoint, DeviceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// TCP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpClientConfig {
    /// 服务器主机地址
    pub host: String,
    /// 服务器端口
    pub port: u16,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 接收缓冲区大小
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_buffer_size() -> usize {
    4096
}

impl TcpClientConfig {
    pub fn from_endpoint(endpoint: &CommunicationEndpoint) -> Self {
        Self {
            host: endpoint.address.clone(),
            port: endpoint.port,
            connect_timeout_ms: endpoint.timeout_ms,
            buffer_size: endpoint.buffer_size,
        }
    }
}

/// 字节流读端（接收原语）
#[derive(Debug)]
pub struct StreamReader {
    reader: OwnedReadHalf,
    buf: Vec<u8>,
}

impl StreamReader {
    pub(crate) fn new(reader: OwnedReadHalf, buffer_size: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; buffer_size.max(1)],
        }
    }

    /// 读取一块数据；对端关闭（零长度读）返回 `Ok(None)`
    pub async fn receive(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }
}

/// TCP 客户端链路
pub struct TcpClientLink {
    device: DeviceKind,
    config: TcpClientConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpClientLink {
    /// 创建新的 TCP 客户端链路
    pub fn new(device: DeviceKind, config: TcpClientConfig) -> Self {
        Self {
            device,
            config,
            writer: Mutex::new(None),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(device: DeviceKind, json: &str) -> Result<Self, ProtocolError> {
        let config: TcpClientConfig = serde_json::from_str(json)
            .map_err(|e| ProtocolError::ConfigParse(e.to_string()))?;
        Ok(Self::new(device, config))
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// 建立连接，返回读端
    pub async fn connect(&self) -> Result<StreamReader, ProtocolError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(target: "station.protocol", device = %self.device, addr = %addr, "tcp_connecting");

        let stream = match tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            TcpStream::connect(&addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProtocolError::Connection(format!("{}: {}", addr, e))),
            Err(_) => {
                return Err(ProtocolError::Timeout(format!(
                    "connect to {} after {}ms",
                    addr, self.config.connect_timeout_ms
                )));
            }
        };
        let _ = stream.set_nodelay(true);

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        info!(target: "station.protocol", device = %self.device, addr = %addr, "tcp_connected");
        Ok(StreamReader::new(reader, self.config.buffer_size))
    }

    /// 发送数据；写失败时丢弃写端
    pub async fn send(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        match result {
            Ok(()) => {
                debug!(device = %self.device, size = bytes.len(), "sent tcp data");
                Ok(())
            }
            Err(e) => {
                warn!(target: "station.protocol", device = %self.device, error = %e, "tcp_send_failed");
                guard.take();
                Err(ProtocolError::Io(e))
            }
        }
    }

    /// 主动断开（关闭写端，读端在对端关闭后自然结束）
    pub async fn disconnect(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
            info!(target: "station.protocol", device = %self.device, "tcp_disconnected");
        }
    }

    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}
