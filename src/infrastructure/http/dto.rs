//! Data Transfer Objects

use serde::Serialize;

use crate::application::metrics::MetricsSnapshot;
use crate::infrastructure::cache::CacheStats;

/// 错误信封
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// 异步任务受理响应（202）
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub job_id: String,
    pub progress: String,
}

/// 任务状态查询响应
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub progress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 任务未完成时的结果查询响应（202）
#[derive(Debug, Serialize)]
pub struct JobPendingResponse {
    pub status: &'static str,
    pub error: &'static str,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// 工作池聚合指标
#[derive(Debug, Serialize)]
pub struct PoolMetricsSummary {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub avg_latency_ms: f64,
}

/// /metrics 响应
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub process: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
    pub pool: PoolMetricsSummary,
}
