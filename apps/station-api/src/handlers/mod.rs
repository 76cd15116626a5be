//! Handlers 模块

pub mod metrics;
pub mod status;
pub mod system;

pub use metrics::*;
pub use status::*;
pub use system::*;
