//! 生产数据汇总：按条码组装四个工序槽位，完成后先落库再上传，失败进入重试队列。

pub mod aggregator;
pub mod error;
pub mod frame;
pub mod transport;

pub use aggregator::{
    Aggregator, AggregatorConfig, AggregatorStats, RecordOutcome, RetrySweepReport,
    tightening_payload,
};
pub use error::{AggregatorError, UploadError};
pub use frame::{LineFramer, StageFrame, extract_barcode, parse_stage_frame};
pub use transport::{HttpUploadTransport, NoopUploadTransport, UploadTransport};
