//! TCP 服务端字节流链路
//!
//! 本机监听端口，等待线体上位机接入。同一时刻只服务一个对端，
//! 新对端接入时替换旧的写端。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let link = TcpServerLink::new(DeviceKind::LinePc, TcpServerConfig::default());
//! link.bind().await?;
//! let (mut reader, peer) = link.accept().await?;
//! ```

use crate::error::ProtocolError;
use crate::tcp_client::StreamReader;
use domain::{CommunicationEndpoint, DeviceKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// TCP 服务端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpServerConfig {
    /// 监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 监听端口（0 表示由系统分配）
    pub listen_port: u16,
    /// 接收缓冲区大小
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_buffer_size() -> usize {
    4096
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: 0,
            buffer_size: default_buffer_size(),
        }
    }
}

impl TcpServerConfig {
    pub fn from_endpoint(endpoint: &CommunicationEndpoint) -> Self {
        Self {
            listen_addr: endpoint.address.clone(),
            listen_port: endpoint.port,
            buffer_size: endpoint.buffer_size,
        }
    }
}

/// TCP 服务端链路
pub struct TcpServerLink {
    device: DeviceKind,
    config: TcpServerConfig,
    listener: Mutex<Option<Arc<TcpListener>>>,
    peer: Mutex<Option<(String, OwnedWriteHalf)>>,
}

impl TcpServerLink {
    pub fn new(device: DeviceKind, config: TcpServerConfig) -> Self {
        Self {
            device,
            config,
            listener: Mutex::new(None),
            peer: Mutex::new(None),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(device: DeviceKind, json: &str) -> Result<Self, ProtocolError> {
        let config: TcpServerConfig = serde_json::from_str(json)
            .map_err(|e| ProtocolError::ConfigParse(e.to_string()))?;
        Ok(Self::new(device, config))
    }

    pub fn device(&self) -> DeviceKind {
        self.device
    }

    /// 开始监听，返回实际绑定地址
    pub async fn bind(&self) -> Result<SocketAddr, ProtocolError> {
        let addr = format!("{}:{}", self.config.listen_addr, self.config.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ProtocolError::Connection(format!("bind {}: {}", addr, e)))?;
        let local = listener.local_addr()?;
        *self.listener.lock().await = Some(Arc::new(listener));
        info!(target: "station.protocol", device = %self.device, addr = %local, "tcp_server_listening");
        Ok(local)
    }

    /// 等待下一个对端接入，返回读端与对端地址
    pub async fn accept(&self) -> Result<(StreamReader, String), ProtocolError> {
        let listener = self
            .listener
            .lock()
            .await
            .clone()
            .ok_or(ProtocolError::NotConnected)?;
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let peer = peer_addr.to_string();
        let (reader, writer) = stream.into_split();

        if let Some((previous, _)) = self.peer.lock().await.replace((peer.clone(), writer)) {
            debug!(device = %self.device, previous = %previous, "replaced previous peer");
        }
        info!(target: "station.protocol", device = %self.device, peer = %peer, "tcp_peer_accepted");
        Ok((StreamReader::new(reader, self.config.buffer_size), peer))
    }

    /// 向当前对端发送数据
    pub async fn send(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let mut guard = self.peer.lock().await;
        let (peer, writer) = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        if let Err(e) = writer.write_all(bytes).await {
            warn!(target: "station.protocol", device = %self.device, peer = %peer, error = %e, "tcp_send_failed");
            guard.take();
            return Err(ProtocolError::Io(e));
        }
        Ok(())
    }

    /// 当前是否有对端接入
    pub async fn has_peer(&self) -> bool {
        self.peer.lock().await.is_some()
    }

    /// 关闭当前对端的写端
    pub async fn close_peer(&self) {
        if let Some((peer, mut writer)) = self.peer.lock().await.take() {
            let _ = writer.shutdown().await;
            info!(target: "station.protocol", device = %self.device, peer = %peer, "tcp_peer_closed");
        }
    }

    /// 停止监听并关闭对端
    pub async fn unbind(&self) {
        self.close_peer().await;
        if self.listener.lock().await.take().is_some() {
            info!(target: "station.protocol", device = %self.device, "tcp_server_stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn local_config() -> TcpServerConfig {
        TcpServerConfig {
            listen_addr: "127.0.0.1".to_string(),
            ..TcpServerConfig::default()
        }
    }

    #[test]
    fn test_parse_config() {
        let link = TcpServerLink::from_json(DeviceKind::LinePc, r#"{"listen_port": 9000}"#).unwrap();
        assert_eq!(link.config.listen_addr, "0.0.0.0");
        assert_eq!(link.config.listen_port, 9000);
    }

    #[tokio::test]
    async fn test_accept_receive_and_reply() {
        let link = TcpServerLink::new(DeviceKind::LinePc, local_config());
        let addr = link.bind().await.unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"{\"stage\":1}\n").await.unwrap();
            let mut buf = [0u8; 3];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let (mut reader, peer) = link.accept().await.unwrap();
        assert!(peer.starts_with("127.0.0.1"));
        assert!(link.has_peer().await);
        let bytes = reader.receive().await.unwrap().unwrap();
        assert_eq!(bytes, b"{\"stage\":1}\n");
        link.send(b"ACK").await.unwrap();
        assert_eq!(&client.await.unwrap(), b"ACK");

        link.unbind().await;
        assert!(!link.has_peer().await);
        assert!(matches!(
            link.accept().await.unwrap_err(),
            ProtocolError::NotConnected
        ));
    }

    #[tokio::test]
    async fn test_send_without_peer() {
        let link = TcpServerLink::new(DeviceKind::LinePc, local_config());
        link.bind().await.unwrap();
        assert!(link.send(b"x").await.is_err());
    }
}
