//! # 设备连接编排能力模块
//!
//! 管理 PLC、条码枪、拧紧轴数据流、线体上位机四路链路：
//!
//! ```text
//! connect_all ──► tokio::join!(PLC, Scanner, TighteningAxis, LinePC)
//!                    │
//!                    ├── 字节流设备：每设备一个接收循环
//!                    └── 线体上位机：监听 + 接入循环
//!                    │
//!                    ▼
//!              ConnectionHub ──► watch（状态快照）
//!                            └─► broadcast（ConnectionChanged / DataReceived）
//! ```
//!
//! - 初始化成功当且仅当 PLC 连上；其余设备失败只记录日志
//! - 零长度读或 I/O 故障结束接收循环并发布断开事件
//! - 编排器不自动重连

pub mod error;
pub mod hub;
pub mod link;
pub mod orchestrator;

pub use error::ConnectionError;
pub use hub::ConnectionHub;
pub use link::RegisterLink;
pub use orchestrator::{ConnectReport, DeviceOrchestrator, StationEndpoints, StreamLinks};
