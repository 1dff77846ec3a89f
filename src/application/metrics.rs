//! 进程级指标
//!
//! 原子计数器，供 /metrics 端点输出快照

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// 指标收集器
///
/// 所有计数为进程生命周期内累计值；min/max 延迟用 i64 纳秒存储
#[derive(Debug)]
pub struct Metrics {
    requests: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
    total_latency_ns: AtomicU64,
    max_latency_ns: AtomicI64,
    min_latency_ns: AtomicI64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            max_latency_ns: AtomicI64::new(0),
            min_latency_ns: AtomicI64::new(i64::MAX),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// 记录一次合成请求
    pub fn record_request(&self, latency: Duration, is_error: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.success.fetch_add(1, Ordering::Relaxed);
        }

        let ns = latency.as_nanos().min(i64::MAX as u128) as i64;
        self.total_latency_ns.fetch_add(ns as u64, Ordering::Relaxed);
        self.max_latency_ns.fetch_max(ns, Ordering::Relaxed);
        self.min_latency_ns.fetch_min(ns, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_ns = self.total_latency_ns.load(Ordering::Relaxed);
        let min_ns = self.min_latency_ns.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests,
            success: self.success.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms: if requests > 0 {
                (total_ns / requests) as f64 / 1_000_000.0
            } else {
                0.0
            },
            max_latency_ms: self.max_latency_ns.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            min_latency_ms: if min_ns == i64::MAX {
                0.0
            } else {
                min_ns as f64 / 1_000_000.0
            },
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.success.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total_latency_ns.store(0, Ordering::Relaxed);
        self.max_latency_ns.store(0, Ordering::Relaxed);
        self.min_latency_ns.store(i64::MAX, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 指标快照
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub min_latency_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record_request(Duration::from_millis(10), false);
        metrics.record_request(Duration::from_millis(30), true);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.success, 1);
        assert_eq!(snap.errors, 1);
        assert!(snap.avg_latency_ms >= 19.0 && snap.avg_latency_ms <= 21.0);
        assert!(snap.max_latency_ms >= 29.0);
        assert!(snap.min_latency_ms <= 11.0);
    }

    #[test]
    fn test_empty_snapshot_has_zero_latency() {
        let snap = Metrics::new().snapshot();
        assert_eq!(snap.avg_latency_ms, 0.0);
        assert_eq!(snap.min_latency_ms, 0.0);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_request(Duration::from_millis(5), false);
        metrics.record_cache_hit();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.cache_hits, 0);
        assert_eq!(snap.min_latency_ms, 0.0);
    }
}
