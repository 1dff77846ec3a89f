//! Application Layer
//!
//! 错误分类、端口定义与进程级指标

pub mod error;
pub mod metrics;
pub mod ports;

pub use error::SynthesisError;
pub use metrics::{Metrics, MetricsSnapshot};
