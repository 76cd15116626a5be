//! # PLC 握手能力模块
//!
//! - [`machine`]：触发寄存器轮询状态机（扫码、拧紧子流程，结果回写）
//! - [`heartbeat`]：独立心跳任务
//! - [`driver`]：拧紧驱动与生产记录写入的接缝，以及基于拧紧轴控制器和汇总模块的实现
//! - [`registers`]：寄存器地址表与取值约定
//! - [`scan`]：只保留最近一次扫码的条码通道

pub mod driver;
pub mod error;
pub mod heartbeat;
pub mod machine;
pub mod registers;
pub mod scan;

pub use driver::{AxisTighteningDriver, TighteningDriver, TighteningRecorder};
pub use error::HandshakeError;
pub use heartbeat::Heartbeat;
pub use machine::{CycleOutcome, HandshakeConfig, HandshakeState, PlcHandshake};
pub use registers::{
    PlcRegisterMap, RESULT_NG, RESULT_OK, TRIGGER_CLEARED, TRIGGER_RAISED,
};
pub use scan::{ScanPublisher, ScanReceiver, scan_channel};
