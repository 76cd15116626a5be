//! 工位对外发布的事件。

use crate::device::DeviceKind;

/// 工位事件（通过 broadcast 通道分发给外壳与其他订阅者）。
#[derive(Debug, Clone, PartialEq)]
pub enum StationEvent {
    /// 设备连接状态变化
    ConnectionChanged { device: DeviceKind, connected: bool },
    /// 条码枪扫到条码
    BarcodeScanned { barcode: String },
    /// 线体上位机上报的原始数据
    DataReceived { payload: String },
    /// 拧紧轴字节流上报的原始数据
    ScrewDataReceived { payload: String },
    /// PLC 触发信号（拉起/复位）
    PlcTrigger { raised: bool },
    /// 工序状态变化
    ProcessStatusChanged { barcode: String, status: String },
    /// 当前在制品变化
    CurrentProductChanged { barcode: String, status: String },
}
