//! 最近一次扫码
//!
//! 条码枪可能在一个拧紧周期内连续扫多次，握手只关心扫码触发时最新的那一个：
//! 新条码覆盖旧条码，握手取走后清空，不存在排队和丢弃新条码的情况。

use tokio::sync::watch;

/// 扫码发布端（链路事件翻译一侧持有）。
#[derive(Debug, Clone)]
pub struct ScanPublisher {
    tx: watch::Sender<Option<String>>,
}

impl ScanPublisher {
    pub fn publish(&self, barcode: String) {
        self.tx.send_replace(Some(barcode));
    }
}

/// 扫码接收端（握手状态机持有）。
#[derive(Debug)]
pub struct ScanReceiver {
    rx: watch::Receiver<Option<String>>,
}

pub fn scan_channel() -> (ScanPublisher, ScanReceiver) {
    let (tx, rx) = watch::channel(None);
    (ScanPublisher { tx }, ScanReceiver { rx })
}

impl ScanReceiver {
    /// 取走尚未使用过的最近一次扫码
    pub fn take_latest(&mut self) -> Option<String> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// 等待下一次扫码；发布端全部关闭时返回 None
    pub async fn next(&mut self) -> Option<String> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(barcode) = self.rx.borrow_and_update().clone() {
                return Some(barcode);
            }
        }
    }
}
