//! 链路事件翻译
//!
//! 把编排器发布的原始字节转成工位事件：条码枪按行切出条码交给握手状态机，
//! 上位机按行解析工序帧后经无损通道交给写入任务，拧紧轴字节流原样转发。
//! 翻译循环本身不做任何 IO 等待，落库和上传都在写入任务里进行。

use domain::{DeviceKind, StationEvent, UNKNOWN_BARCODE};
use station_handshake::ScanPublisher;
use station_pipeline::{
    Aggregator, AggregatorError, LineFramer, RecordOutcome, StageFrame, extract_barcode,
    parse_stage_frame,
};
use station_protocol::ProtocolEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct EventRouter {
    events: broadcast::Sender<StationEvent>,
    scans: ScanPublisher,
    stages: mpsc::UnboundedSender<StageFrame>,
    scanner: LineFramer,
    line_pc: LineFramer,
}

impl EventRouter {
    pub fn new(
        events: broadcast::Sender<StationEvent>,
        scans: ScanPublisher,
        stages: mpsc::UnboundedSender<StageFrame>,
        scanner_max_line: usize,
        line_pc_max_frame: usize,
    ) -> Self {
        Self {
            events,
            scans,
            stages,
            scanner: LineFramer::new(scanner_max_line),
            line_pc: LineFramer::new(line_pc_max_frame),
        }
    }

    pub async fn run(
        mut self,
        mut rx: broadcast::Receiver<ProtocolEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => self.handle(event),
                Err(RecvError::Lagged(skipped)) => self.on_lagged(skipped),
                Err(RecvError::Closed) => break,
            }
        }
        debug!("event router stopped");
    }

    /// 事件滞后丢了字节：半行已不可信，两个行缓冲都清空。
    pub fn on_lagged(&mut self, skipped: u64) {
        warn!(target: "station.api", skipped = skipped, "protocol_events_lagged");
        self.scanner.reset();
        self.line_pc.reset();
    }

    pub fn handle(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::ConnectionChanged { device, connected } => {
                if !connected {
                    match device {
                        DeviceKind::Scanner => self.scanner.reset(),
                        DeviceKind::LinePc => self.line_pc.reset(),
                        _ => {}
                    }
                }
                self.emit(StationEvent::ConnectionChanged { device, connected });
            }
            ProtocolEvent::DataReceived {
                device, payload, ..
            } => match device {
                DeviceKind::Scanner => self.on_scanner_bytes(&payload),
                DeviceKind::LinePc => self.on_line_pc_bytes(&payload),
                DeviceKind::TighteningAxis => {
                    self.emit(StationEvent::ScrewDataReceived {
                        payload: String::from_utf8_lossy(&payload).into_owned(),
                    });
                }
                DeviceKind::Plc => {}
            },
        }
    }

    fn on_scanner_bytes(&mut self, payload: &[u8]) {
        let lines = self.scanner.push(payload);
        log_discarded(DeviceKind::Scanner, self.scanner.take_discarded());
        for line in lines {
            let barcode = extract_barcode(&line);
            if barcode == UNKNOWN_BARCODE {
                warn!(target: "station.api", line = %line, "scanner_line_unreadable");
                continue;
            }
            info!(target: "station.api", barcode = %barcode, "barcode_scanned");
            self.emit(StationEvent::BarcodeScanned {
                barcode: barcode.clone(),
            });
            self.scans.publish(barcode);
        }
    }

    fn on_line_pc_bytes(&mut self, payload: &[u8]) {
        let lines = self.line_pc.push(payload);
        log_discarded(DeviceKind::LinePc, self.line_pc.take_discarded());
        for line in lines {
            self.emit(StationEvent::DataReceived {
                payload: line.clone(),
            });
            let frame = match parse_stage_frame(&line) {
                Ok(frame) => frame,
                Err(reason) => {
                    warn!(target: "station.api", reason = %reason, "line_pc_frame_skipped");
                    continue;
                }
            };
            if let Err(err) = self.stages.send(frame) {
                error!(target: "station.api", barcode = %err.0.barcode, "stage_writer_closed");
            }
        }
    }

    fn emit(&self, event: StationEvent) {
        let _ = self.events.send(event);
    }
}

fn log_discarded(device: DeviceKind, discarded: usize) {
    if discarded > 0 {
        warn!(target: "station.api", device = %device, discarded = discarded, "overlong_line_discarded");
    }
}

/// 工序帧写入任务：按到达顺序写入汇总模块。
///
/// 取消后先把通道里已收到的帧写完再退出。
pub async fn write_stage_frames(
    aggregator: Aggregator,
    mut frames: mpsc::UnboundedReceiver<StageFrame>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => frame,
        };
        match frame {
            Some(frame) => record_frame(&aggregator, frame).await,
            None => break,
        }
    }
    frames.close();
    while let Ok(frame) = frames.try_recv() {
        record_frame(&aggregator, frame).await;
    }
    debug!("stage writer stopped");
}

async fn record_frame(aggregator: &Aggregator, frame: StageFrame) {
    match aggregator
        .record_stage_data(&frame.barcode, frame.stage_index, frame.data)
        .await
    {
        Ok(RecordOutcome::Partial { filled }) => {
            debug!(barcode = %frame.barcode, filled = filled, "stage data recorded");
        }
        Ok(RecordOutcome::Completed { uploaded }) => {
            info!(
                target: "station.api",
                barcode = %frame.barcode,
                uploaded = uploaded,
                "production_record_completed"
            );
        }
        Err(AggregatorError::Persistence(err)) => {
            error!(target: "station.api", barcode = %frame.barcode, error = %err, "stage_data_persist_failed");
        }
        Err(err) => {
            warn!(target: "station.api", barcode = %frame.barcode, error = %err, "stage_data_rejected");
        }
    }
}

/// 工位事件日志（外壳渲染之外的唯一订阅者）。
pub async fn log_station_events(
    mut rx: broadcast::Receiver<StationEvent>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "station.api", skipped = skipped, "station_events_lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &StationEvent) {
    match event {
        StationEvent::ConnectionChanged { device, connected } => {
            info!(target: "station.api", device = %device, connected = *connected, "device_connection_changed");
        }
        StationEvent::BarcodeScanned { .. } => {}
        StationEvent::DataReceived { payload } => {
            debug!(payload = %payload, "line pc data received");
        }
        StationEvent::ScrewDataReceived { payload } => {
            debug!(payload = %payload, "axis stream data received");
        }
        StationEvent::PlcTrigger { raised } => {
            debug!(raised = *raised, "plc trigger");
        }
        StationEvent::ProcessStatusChanged { barcode, status } => {
            info!(target: "station.api", barcode = %barcode, status = %status, "process_status_changed");
        }
        StationEvent::CurrentProductChanged { barcode, status } => {
            info!(target: "station.api", barcode = %barcode, status = %status, "current_product_changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::now_epoch_ms;
    use serde_json::json;
    use station_handshake::{ScanReceiver, scan_channel};
    use station_pipeline::NoopUploadTransport;
    use station_storage::{InMemoryRecordStore, InMemoryUploadQueueStore, RecordStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn router(
        line_pc_max_frame: usize,
    ) -> (
        EventRouter,
        broadcast::Receiver<StationEvent>,
        ScanReceiver,
        mpsc::UnboundedReceiver<StageFrame>,
    ) {
        let (events, events_rx) = broadcast::channel(64);
        let (scans, scans_rx) = scan_channel();
        let (stages, stages_rx) = mpsc::unbounded_channel();
        (
            EventRouter::new(events, scans, stages, 64, line_pc_max_frame),
            events_rx,
            scans_rx,
            stages_rx,
        )
    }

    fn data(device: DeviceKind, payload: &[u8]) -> ProtocolEvent {
        ProtocolEvent::DataReceived {
            device,
            payload: payload.to_vec(),
            received_at_ms: now_epoch_ms(),
        }
    }

    #[test]
    fn scanner_lines_become_barcodes() {
        let (mut router, mut events, mut scans, _) = router(256);
        router.handle(data(DeviceKind::Scanner, b"SN-0"));
        router.handle(data(DeviceKind::Scanner, b"001\r\n"));

        assert_eq!(scans.take_latest().as_deref(), Some("SN-0001"));
        assert_eq!(
            events.try_recv().unwrap(),
            StationEvent::BarcodeScanned {
                barcode: "SN-0001".to_string()
            }
        );
    }

    #[test]
    fn scanner_burst_keeps_the_last_barcode() {
        let (mut router, _events, mut scans, _) = router(256);
        for n in 1..=20 {
            router.handle(data(
                DeviceKind::Scanner,
                format!("SN-{:04}\r\n", n).as_bytes(),
            ));
        }
        assert_eq!(scans.take_latest().as_deref(), Some("SN-0020"));
        assert_eq!(scans.take_latest(), None);
    }

    #[test]
    fn scanner_drop_discards_partial_line() {
        let (mut router, _events, mut scans, _) = router(256);
        router.handle(data(DeviceKind::Scanner, b"SN-HALF"));
        router.handle(ProtocolEvent::ConnectionChanged {
            device: DeviceKind::Scanner,
            connected: false,
        });
        router.handle(data(DeviceKind::Scanner, b"SN-0002\n"));
        assert_eq!(scans.take_latest().as_deref(), Some("SN-0002"));

        router.handle(data(
            DeviceKind::Scanner,
            b"{\"sn\":\"SN-0003\"}\r\nbad read\r\n",
        ));
        assert_eq!(scans.take_latest().as_deref(), Some("SN-0003"));
        assert_eq!(scans.take_latest(), None);
    }

    #[test]
    fn lag_resets_half_lines() {
        let (mut router, _events, mut scans, _) = router(256);
        router.handle(data(DeviceKind::Scanner, b"SN-HA"));
        router.on_lagged(3);
        router.handle(data(DeviceKind::Scanner, b"SN-0004\r\n"));
        assert_eq!(scans.take_latest().as_deref(), Some("SN-0004"));
    }

    #[test]
    fn overlong_scanner_line_is_not_truncated_into_a_barcode() {
        let (mut router, _events, mut scans, _) = router(256);
        let long = format!("SN-{}\r\n", "9".repeat(100));
        router.handle(data(DeviceKind::Scanner, long.as_bytes()));
        assert_eq!(scans.take_latest(), None);
    }

    #[test]
    fn line_pc_frames_are_queued_for_the_writer() {
        let (mut router, mut events, _, mut stages) = router(256);
        router.handle(data(
            DeviceKind::LinePc,
            b"{\"barcode\":\"SN-1\",\"stage\":2,\"data\":{\"ok\":true}}\nnot json\n",
        ));

        assert!(matches!(
            events.try_recv().unwrap(),
            StationEvent::DataReceived { .. }
        ));
        assert_eq!(
            events.try_recv().unwrap(),
            StationEvent::DataReceived {
                payload: "not json".to_string()
            }
        );
        let frame = stages.try_recv().unwrap();
        assert_eq!(frame.barcode, "SN-1");
        assert_eq!(frame.stage_index, 1);
        assert!(stages.try_recv().is_err());
    }

    #[test]
    fn line_pc_frames_longer_than_receive_buffer_survive() {
        let (mut router, _events, _, mut stages) = router(64 * 1024);
        let frame = json!({
            "barcode": "SN-BIG",
            "stage": 1,
            "data": { "curve": "x".repeat(10_000) },
        })
        .to_string();
        for chunk in format!("{}\n", frame).as_bytes().chunks(4096) {
            router.handle(data(DeviceKind::LinePc, chunk));
        }
        let frame = stages.try_recv().unwrap();
        assert_eq!(frame.barcode, "SN-BIG");
        assert_eq!(frame.data["curve"].as_str().unwrap().len(), 10_000);
    }

    #[tokio::test]
    async fn stage_writer_records_every_frame() {
        let records = Arc::new(InMemoryRecordStore::new());
        let aggregator = Aggregator::new(
            records.clone(),
            Arc::new(InMemoryUploadQueueStore::new()),
            Arc::new(NoopUploadTransport),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        for stage_index in 0..3 {
            tx.send(StageFrame {
                barcode: "SN-W".to_string(),
                stage_index,
                data: json!(stage_index),
            })
            .unwrap();
        }
        tx.send(StageFrame {
            barcode: "SN-OTHER".to_string(),
            stage_index: 0,
            data: json!("a"),
        })
        .unwrap();

        // 取消前已入队的帧同样会被写完
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            Duration::from_secs(1),
            write_stage_frames(aggregator.clone(), rx, cancel),
        )
        .await
        .unwrap();

        assert_eq!(aggregator.partial_count(), 2);
        assert!(records.find_by_barcode("SN-W").await.unwrap().is_empty());
    }
}
