//! Segmentation Pipeline
//!
//! 分段工作池与长文本编排

mod long_text;
mod worker_pool;

pub use long_text::{LongTextServiceConfig, LongTextSynthesizer};
pub use worker_pool::{PoolMetrics, PoolStats, SegmentJob, SegmentResult, WorkerPool};
