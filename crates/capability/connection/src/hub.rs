//! 连接状态与原始数据的发布中心
//!
//! 每个设备一个 `watch` 通道保存当前状态（单写多读），
//! 连通性变化与收到的原始字节通过 `broadcast` 转发给订阅者。

use async_trait::async_trait;
use domain::{DeviceConnectionState, DeviceKind, now_epoch_ms};
use station_protocol::{ProtocolError, ProtocolEvent, ProtocolEventHandler};
use station_telemetry::record_connection_drop;
use std::collections::HashMap;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

pub struct ConnectionHub {
    states: HashMap<DeviceKind, watch::Sender<DeviceConnectionState>>,
    events: broadcast::Sender<ProtocolEvent>,
}

impl ConnectionHub {
    pub fn new(capacity: usize) -> Self {
        let states = DeviceKind::ALL
            .iter()
            .map(|device| {
                let (tx, _rx) = watch::channel(DeviceConnectionState::Disconnected);
                (*device, tx)
            })
            .collect();
        let (events, _rx) = broadcast::channel(capacity.max(1));
        Self { states, events }
    }

    pub fn state(&self, device: DeviceKind) -> DeviceConnectionState {
        self.states
            .get(&device)
            .map(|tx| *tx.borrow())
            .unwrap_or_default()
    }

    pub fn watch(&self, device: DeviceKind) -> Option<watch::Receiver<DeviceConnectionState>> {
        self.states.get(&device).map(watch::Sender::subscribe)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }

    /// 写入设备状态；连通性翻转时发布 `ConnectionChanged`。
    pub fn set_state(&self, device: DeviceKind, state: DeviceConnectionState) {
        let Some(tx) = self.states.get(&device) else {
            return;
        };
        let previous = tx.send_replace(state);
        if previous.is_connected() == state.is_connected() {
            return;
        }
        if previous.is_connected() {
            record_connection_drop();
            warn!(target: "station.connection", device = %device, state = ?state, "device_disconnected");
        } else {
            info!(target: "station.connection", device = %device, "device_connected");
        }
        let _ = self.events.send(ProtocolEvent::ConnectionChanged {
            device,
            connected: state.is_connected(),
        });
    }

    /// 链路自行报告掉线：仅在当前为已连接时置为故障。
    pub fn mark_lost(&self, device: DeviceKind) {
        if self.state(device).is_connected() {
            self.set_state(device, DeviceConnectionState::Faulted);
        }
    }

    pub fn publish_data(&self, device: DeviceKind, payload: Vec<u8>) {
        let _ = self.events.send(ProtocolEvent::DataReceived {
            device,
            payload,
            received_at_ms: now_epoch_ms(),
        });
    }
}

#[async_trait]
impl ProtocolEventHandler for ConnectionHub {
    async fn handle(&self, event: ProtocolEvent) -> Result<(), ProtocolError> {
        match event {
            ProtocolEvent::ConnectionChanged {
                device,
                connected: true,
            } => self.set_state(device, DeviceConnectionState::Connected),
            ProtocolEvent::ConnectionChanged {
                device,
                connected: false,
            } => self.mark_lost(device),
            ProtocolEvent::DataReceived {
                device, payload, ..
            } => self.publish_data(device, payload),
        }
        Ok(())
    }
}
