//! 上传通道：HTTP（reqwest）与空通道。

use crate::error::UploadError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// 生产记录上传通道抽象。
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, barcode: &str, payload: &str) -> Result<(), UploadError>;
}

/// 空上传通道（未配置上传地址时使用，视为上传成功）。
#[derive(Debug, Default)]
pub struct NoopUploadTransport;

#[async_trait]
impl UploadTransport for NoopUploadTransport {
    async fn upload(&self, barcode: &str, _payload: &str) -> Result<(), UploadError> {
        info!(target: "station.pipeline", barcode = %barcode, "upload_skipped_noop");
        Ok(())
    }
}

/// HTTP 上传通道：POST JSON 文档到固定地址。
#[derive(Debug, Clone)]
pub struct HttpUploadTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpUploadTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UploadError::Config(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(&self, barcode: &str, payload: &str) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-barcode", barcode)
            .body(payload.to_string())
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
