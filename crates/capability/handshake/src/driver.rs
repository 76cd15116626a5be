//! 握手状态机与拧紧轴、汇总模块之间的接缝

use crate::error::HandshakeError;
use async_trait::async_trait;
use domain::TighteningAxisSample;
use station_pipeline::{Aggregator, RecordOutcome};
use station_tightening::{TighteningAxisController, TighteningParams};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 执行一次拧紧并等待完成。
#[async_trait]
pub trait TighteningDriver: Send + Sync {
    async fn tighten(&self) -> Result<TighteningAxisSample, HandshakeError>;
}

/// 将拧紧结果写入生产记录。
#[async_trait]
pub trait TighteningRecorder: Send + Sync {
    async fn record_tightening(
        &self,
        barcode: &str,
        sample: &TighteningAxisSample,
    ) -> Result<(), HandshakeError>;
}

/// 基于拧紧轴控制器的驱动：下发固定参数后等待完成。
pub struct AxisTighteningDriver {
    controller: Arc<TighteningAxisController>,
    params: TighteningParams,
    timeout: Duration,
}

impl AxisTighteningDriver {
    pub fn new(
        controller: Arc<TighteningAxisController>,
        params: TighteningParams,
        timeout: Duration,
    ) -> Self {
        Self {
            controller,
            params,
            timeout,
        }
    }
}

#[async_trait]
impl TighteningDriver for AxisTighteningDriver {
    async fn tighten(&self) -> Result<TighteningAxisSample, HandshakeError> {
        self.controller.start(self.params).await?;
        Ok(self.controller.wait_for_completion(self.timeout).await?)
    }
}

#[async_trait]
impl TighteningRecorder for Aggregator {
    async fn record_tightening(
        &self,
        barcode: &str,
        sample: &TighteningAxisSample,
    ) -> Result<(), HandshakeError> {
        let outcome = self
            .record_tightening_result(barcode, sample)
            .await
            .map_err(|err| HandshakeError::Recording(err.to_string()))?;
        if let RecordOutcome::Completed { uploaded } = outcome {
            info!(target: "station.handshake", barcode = %barcode, uploaded = uploaded, "production_record_completed");
        }
        Ok(())
    }
}
