//! PLC 心跳：独立于握手状态机，每拍在 0/1 之间翻转

use station_protocol::RegisterClient;
use station_telemetry::record_heartbeat_failure;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Heartbeat {
    plc: Arc<dyn RegisterClient>,
    register: u16,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(plc: Arc<dyn RegisterClient>, register: u16, interval: Duration) -> Self {
        Self {
            plc,
            register,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// 心跳循环；写失败只计数，连续失败只记录首条日志。
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            target: "station.handshake",
            register = self.register,
            interval_ms = self.interval.as_millis() as u64,
            "heartbeat_started"
        );
        let mut value: u16 = 0;
        let mut failing = false;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.plc.is_connected() {
                value ^= 1;
                match self.plc.write_register(self.register, value).await {
                    Ok(()) => {
                        if failing {
                            info!(target: "station.handshake", "heartbeat_recovered");
                        }
                        failing = false;
                    }
                    Err(err) => {
                        record_heartbeat_failure();
                        if !failing {
                            warn!(target: "station.handshake", error = %err, "heartbeat_write_failed");
                        } else {
                            debug!(error = %err, "heartbeat write failed again");
                        }
                        failing = true;
                    }
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(target: "station.handshake", "heartbeat_stopped");
    }
}
