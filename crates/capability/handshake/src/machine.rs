//! PLC 握手状态机
//!
//! 单个轮询循环读取两个触发寄存器，同一时间只处理一个触发周期：
//!
//! ```text
//! Idle ─ScanTrigger=1─► ScanPending ─条码/超时─► ScanConfirmed
//!   ▲                                                │
//!   │                                   TighteningTrigger=1
//!   │                                                ▼
//!   └──────────── TighteningConfirmed ◄── TighteningPending
//! ```
//!
//! 结果写回后把触发寄存器清零；PLC 链路在周期中途断开时放弃本周期，不写结果。

use crate::driver::{TighteningDriver, TighteningRecorder};
use crate::error::HandshakeError;
use crate::registers::{PlcRegisterMap, RESULT_NG, RESULT_OK, TRIGGER_CLEARED, TRIGGER_RAISED};
use crate::scan::ScanReceiver;
use domain::{StationEvent, UNKNOWN_BARCODE};
use serde::Serialize;
use station_protocol::RegisterClient;
use station_telemetry::{record_plc_poll_failure, record_trigger_cycle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 握手状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HandshakeState {
    #[default]
    Idle,
    ScanPending,
    ScanConfirmed,
    TighteningPending,
    TighteningConfirmed,
}

/// 握手参数。
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub registers: PlcRegisterMap,
    pub poll_interval: Duration,
    /// 扫码触发后等待条码的时长
    pub scan_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            registers: PlcRegisterMap::default(),
            poll_interval: Duration::from_millis(100),
            scan_timeout: Duration::from_secs(10),
        }
    }
}

/// 一次触发周期的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 扫码周期结束；超时为 None
    Scanned { barcode: Option<String> },
    /// 拧紧周期结束，附带写回的结果值
    Tightened { barcode: String, result: u16 },
    /// 上一拍未写成功的结果已补写
    Acknowledged,
}

/// 待写回的结果（结果寄存器 + 要清零的触发寄存器）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingAck {
    result_register: u16,
    value: u16,
    trigger_register: u16,
}

pub struct PlcHandshake {
    plc: Arc<dyn RegisterClient>,
    driver: Arc<dyn TighteningDriver>,
    recorder: Arc<dyn TighteningRecorder>,
    config: HandshakeConfig,
    state: watch::Sender<HandshakeState>,
    current_barcode: watch::Sender<Option<String>>,
    pending_ack: Mutex<Option<PendingAck>>,
    events: Option<broadcast::Sender<StationEvent>>,
}

impl PlcHandshake {
    pub fn new(
        plc: Arc<dyn RegisterClient>,
        driver: Arc<dyn TighteningDriver>,
        recorder: Arc<dyn TighteningRecorder>,
        config: HandshakeConfig,
    ) -> Self {
        let (state, _rx) = watch::channel(HandshakeState::Idle);
        let (current_barcode, _rx) = watch::channel(None);
        Self {
            plc,
            driver,
            recorder,
            config,
            state,
            current_barcode,
            pending_ack: Mutex::new(None),
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<StationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<HandshakeState> {
        self.state.subscribe()
    }

    /// 当前在制品条码（最近一次扫码周期确认的条码）。
    pub fn current_barcode(&self) -> Option<String> {
        self.current_barcode.borrow().clone()
    }

    /// 轮询循环；单拍失败只记录日志，不退出。
    pub async fn run(&self, mut barcodes: ScanReceiver, cancel: CancellationToken) {
        info!(
            target: "station.handshake",
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "handshake_started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.poll_once(&mut barcodes, &cancel).await {
                Ok(Some(outcome)) => {
                    debug!(outcome = ?outcome, "handshake cycle finished");
                }
                Ok(None) => {}
                Err(HandshakeError::Stopped) => break,
                Err(HandshakeError::PlcLost) => {
                    warn!(target: "station.handshake", "handshake_cycle_abandoned_plc_lost");
                }
                Err(err) => {
                    record_plc_poll_failure();
                    warn!(target: "station.handshake", error = %err, "handshake_tick_failed");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        self.state.send_replace(HandshakeState::Idle);
        info!(target: "station.handshake", "handshake_stopped");
    }

    /// 执行一拍：补写未完成的结果，或读取触发寄存器并处理触发。
    pub async fn poll_once(
        &self,
        barcodes: &mut ScanReceiver,
        cancel: &CancellationToken,
    ) -> Result<Option<CycleOutcome>, HandshakeError> {
        if !self.plc.is_connected() {
            debug!("plc link down, handshake tick skipped");
            return Ok(None);
        }

        let pending = *self.pending_ack.lock().await;
        if let Some(ack) = pending {
            self.complete_cycle(ack).await?;
            return Ok(Some(CycleOutcome::Acknowledged));
        }

        let registers = self.config.registers;
        let scan = self.plc.read_register(registers.scan_trigger).await?;
        if scan == TRIGGER_RAISED {
            return self.scan_cycle(barcodes, cancel).await.map(Some);
        }
        let tightening = self.plc.read_register(registers.tightening_trigger).await?;
        if tightening == TRIGGER_RAISED {
            return self.tightening_cycle(cancel).await.map(Some);
        }
        Ok(None)
    }

    async fn scan_cycle(
        &self,
        barcodes: &mut ScanReceiver,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, HandshakeError> {
        record_trigger_cycle();
        self.state.send_replace(HandshakeState::ScanPending);
        self.emit(StationEvent::PlcTrigger { raised: true });
        info!(target: "station.handshake", "plc_scan_trigger_detected");

        // 触发前已到达的条码取最新一个
        let mut barcode = barcodes.take_latest();
        if barcode.is_none() {
            barcode = tokio::select! {
                _ = cancel.cancelled() => return Err(HandshakeError::Stopped),
                received = tokio::time::timeout(self.config.scan_timeout, barcodes.next()) => {
                    received.ok().flatten()
                }
            };
        }

        if !self.plc.is_connected() {
            self.abandon();
            return Err(HandshakeError::PlcLost);
        }

        let value = match &barcode {
            Some(scanned) => {
                self.current_barcode.send_replace(Some(scanned.clone()));
                self.emit(StationEvent::CurrentProductChanged {
                    barcode: scanned.clone(),
                    status: "Scanned".to_string(),
                });
                info!(target: "station.handshake", barcode = %scanned, "plc_scan_confirmed");
                RESULT_OK
            }
            None => {
                warn!(
                    target: "station.handshake",
                    timeout_ms = self.config.scan_timeout.as_millis() as u64,
                    "plc_scan_timeout"
                );
                RESULT_NG
            }
        };
        let registers = self.config.registers;
        self.complete_cycle(PendingAck {
            result_register: registers.scan_result,
            value,
            trigger_register: registers.scan_trigger,
        })
        .await?;
        Ok(CycleOutcome::Scanned { barcode })
    }

    async fn tightening_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, HandshakeError> {
        record_trigger_cycle();
        self.state.send_replace(HandshakeState::TighteningPending);
        self.emit(StationEvent::PlcTrigger { raised: true });
        let barcode = self
            .current_barcode()
            .unwrap_or_else(|| UNKNOWN_BARCODE.to_string());
        info!(target: "station.handshake", barcode = %barcode, "plc_tightening_trigger_detected");
        self.emit(StationEvent::CurrentProductChanged {
            barcode: barcode.clone(),
            status: "Tightening".to_string(),
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(HandshakeError::Stopped),
            outcome = self.driver.tighten() => outcome,
        };

        if !self.plc.is_connected() {
            warn!(target: "station.handshake", barcode = %barcode, "plc_lost_during_tightening");
            self.abandon();
            return Err(HandshakeError::PlcLost);
        }

        let value = match outcome {
            Ok(sample) => {
                let mut value = if sample.is_qualified() {
                    RESULT_OK
                } else {
                    RESULT_NG
                };
                if let Err(err) = self.recorder.record_tightening(&barcode, &sample).await {
                    error!(
                        target: "station.handshake",
                        barcode = %barcode,
                        error = %err,
                        "tightening_record_failed"
                    );
                    value = RESULT_NG;
                }
                self.emit(StationEvent::CurrentProductChanged {
                    barcode: barcode.clone(),
                    status: sample.quality_result().to_string(),
                });
                info!(
                    target: "station.handshake",
                    barcode = %barcode,
                    quality = sample.quality_result(),
                    result = value,
                    "plc_tightening_finished"
                );
                value
            }
            Err(err) => {
                warn!(target: "station.handshake", barcode = %barcode, error = %err, "plc_tightening_failed");
                self.emit(StationEvent::CurrentProductChanged {
                    barcode: barcode.clone(),
                    status: "TighteningFailed".to_string(),
                });
                RESULT_NG
            }
        };

        let registers = self.config.registers;
        self.complete_cycle(PendingAck {
            result_register: registers.tightening_result,
            value,
            trigger_register: registers.tightening_trigger,
        })
        .await?;
        Ok(CycleOutcome::Tightened {
            barcode,
            result: value,
        })
    }

    /// 写回结果并清零触发；非链路故障时保留待写结果，下一拍补写。
    async fn complete_cycle(&self, ack: PendingAck) -> Result<(), HandshakeError> {
        let written = self.acknowledge(ack).await;
        let mut pending = self.pending_ack.lock().await;
        match written {
            Ok(()) => {
                pending.take();
                drop(pending);
                self.finish_cycle(ack);
                Ok(())
            }
            Err(err) if self.plc.is_connected() => {
                *pending = Some(ack);
                Err(err)
            }
            Err(_) => {
                pending.take();
                drop(pending);
                self.abandon();
                Err(HandshakeError::PlcLost)
            }
        }
    }

    async fn acknowledge(&self, ack: PendingAck) -> Result<(), HandshakeError> {
        self.plc
            .write_register(ack.result_register, ack.value)
            .await?;
        self.plc
            .write_register(ack.trigger_register, TRIGGER_CLEARED)
            .await?;
        Ok(())
    }

    fn finish_cycle(&self, ack: PendingAck) {
        let registers = self.config.registers;
        let next = if ack.trigger_register == registers.tightening_trigger {
            self.state.send_replace(HandshakeState::TighteningConfirmed);
            self.current_barcode.send_replace(None);
            HandshakeState::Idle
        } else if ack.value == RESULT_OK {
            HandshakeState::ScanConfirmed
        } else {
            HandshakeState::Idle
        };
        self.state.send_replace(next);
        self.emit(StationEvent::PlcTrigger { raised: false });
    }

    fn abandon(&self) {
        self.state.send_replace(HandshakeState::Idle);
    }

    fn emit(&self, event: StationEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
