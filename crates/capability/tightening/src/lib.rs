//! # 拧紧轴控制能力模块
//!
//! - [`registers`]：寄存器块布局、采样解码、拧紧参数编码
//! - [`detector`]：完成判定器（每周期只宣告一次）
//! - [`controller`]：启动/停止、轮询循环、等待完成
//!
//! ```text
//! start(params) ──► 写参数 + 控制字 100
//!                       │
//! run(cancel) ──► poll_once ──► CompletionDetector ──► CycleState::Completed
//!                                                          │
//!                               wait_for_completion ◄──────┘
//! ```

pub mod controller;
pub mod detector;
pub mod error;
pub mod registers;

pub use controller::{AxisControllerConfig, CycleState, FailureTracker, TighteningAxisController};
pub use detector::CompletionDetector;
pub use error::TighteningError;
pub use registers::{AXIS_BLOCK_LEN, AxisRegisterMap, TighteningParams};
