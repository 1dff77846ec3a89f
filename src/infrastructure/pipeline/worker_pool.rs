//! 分段工作池
//!
//! 有界并发执行分段合成任务：N 个 worker 消费容量为 2N 的任务队列，
//! 结果按完成顺序（非索引顺序）写入结果通道。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::application::ports::Synthesizer;
use crate::domain::speech::SpeechRequest;

/// 默认 worker 数量
const DEFAULT_WORKERS: usize = 5;
/// worker 数量上限
const MAX_WORKERS: usize = 50;
/// 关闭时等待 worker 退出的宽限时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 分段合成任务
#[derive(Debug)]
pub struct SegmentJob {
    /// 任务 ID（job_id + 片段索引）
    pub id: String,
    /// 片段索引（用于保持顺序）
    pub index: usize,
    /// 单片段合成请求
    pub request: SpeechRequest,
    /// 调用方的取消句柄
    pub cancel: CancellationToken,
}

/// 分段合成结果
///
/// 结果之间不保证顺序，编排层按 `index` 归位
#[derive(Debug)]
pub struct SegmentResult {
    pub id: String,
    pub index: usize,
    pub outcome: Result<Vec<u8>, SynthesisError>,
    pub elapsed: Duration,
}

/// 工作池性能指标
///
/// 计数器为原子变量；延迟累加和由短临界区互斥锁保护
#[derive(Debug, Default)]
pub struct PoolMetrics {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    latency_sum: Mutex<Duration>,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_submitted(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completed(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let mut sum = self.latency_sum.lock().expect("latency lock poisoned");
        *sum += elapsed;
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// 平均任务延迟
    pub fn average_latency(&self) -> Duration {
        let completed = self.completed.load(Ordering::Relaxed);
        if completed == 0 {
            return Duration::ZERO;
        }
        let sum = *self.latency_sum.lock().expect("latency lock poisoned");
        sum / completed as u32
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// 工作池统计信息
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub queue_length: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

/// 分段工作池
///
/// 一个池实例服务一次长文本请求；`metrics` 跨池共享以聚合统计
pub struct WorkerPool {
    jobs_tx: Mutex<Option<mpsc::Sender<SegmentJob>>>,
    results_rx: Mutex<Option<mpsc::Receiver<SegmentResult>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    queue_capacity: usize,
    metrics: Arc<PoolMetrics>,
}

impl WorkerPool {
    /// 启动工作池
    ///
    /// `workers` 为 0 时取默认值，并被限制在 `[1, 50]`
    pub fn start(workers: usize, engine: Arc<dyn Synthesizer>, metrics: Arc<PoolMetrics>) -> Self {
        let workers = if workers == 0 {
            DEFAULT_WORKERS
        } else {
            workers.min(MAX_WORKERS)
        };
        let queue_capacity = workers * 2;

        let (jobs_tx, jobs_rx) = mpsc::channel::<SegmentJob>(queue_capacity);
        let (results_tx, results_rx) = mpsc::channel::<SegmentResult>(queue_capacity);

        let cancel = CancellationToken::new();
        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));

        tracing::debug!(workers, queue_capacity, "Starting worker pool");

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let jobs_rx = jobs_rx.clone();
            let results_tx = results_tx.clone();
            let engine = engine.clone();
            let cancel = cancel.clone();
            let metrics = metrics.clone();

            handles.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, jobs_rx, results_tx, engine, cancel, metrics).await;
            }));
        }

        Self {
            jobs_tx: Mutex::new(Some(jobs_tx)),
            results_rx: Mutex::new(Some(results_rx)),
            cancel,
            closed: AtomicBool::new(false),
            handles: Mutex::new(handles),
            queue_capacity,
            metrics,
        }
    }

    /// worker 主循环：接收任务、检查取消、执行合成、发送结果
    async fn worker_loop(
        worker_id: usize,
        jobs_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<SegmentJob>>>,
        results_tx: mpsc::Sender<SegmentResult>,
        engine: Arc<dyn Synthesizer>,
        cancel: CancellationToken,
        metrics: Arc<PoolMetrics>,
    ) {
        tracing::trace!(worker_id, "Worker started");

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = async { jobs_rx.lock().await.recv().await } => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let result = Self::process_job(job, worker_id, engine.as_ref(), &metrics).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = results_tx.send(result) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::trace!(worker_id, "Worker stopped");
    }

    /// 处理单个任务
    async fn process_job(
        job: SegmentJob,
        worker_id: usize,
        engine: &dyn Synthesizer,
        metrics: &PoolMetrics,
    ) -> SegmentResult {
        let start = Instant::now();

        tracing::trace!(worker_id, job_id = %job.id, index = job.index, "Worker processing job");

        if job.cancel.is_cancelled() {
            metrics.record_failed();
            return SegmentResult {
                id: job.id,
                index: job.index,
                outcome: Err(SynthesisError::Internal(format!(
                    "job cancelled before processing segment {}",
                    job.index
                ))),
                elapsed: start.elapsed(),
            };
        }

        let outcome = match engine.synthesize(&job.request, &job.cancel).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                metrics.record_completed(elapsed);
                tracing::trace!(
                    worker_id,
                    job_id = %job.id,
                    bytes = response.audio.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Worker completed job"
                );
                Ok(response.audio)
            }
            Err(err) => {
                metrics.record_failed();
                tracing::error!(
                    worker_id,
                    job_id = %job.id,
                    index = job.index,
                    error = %err,
                    "Worker failed to synthesize segment"
                );
                Err(err)
            }
        };

        SegmentResult {
            id: job.id,
            index: job.index,
            outcome,
            elapsed: start.elapsed(),
        }
    }

    /// 提交任务到工作池
    ///
    /// 先尝试非阻塞发送；队列满时记录警告并阻塞等待，
    /// 等待期间响应池取消与任务取消
    pub async fn submit(&self, job: SegmentJob) -> Result<(), SynthesisError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SynthesisError::Internal("worker pool is closed".to_string()));
        }

        if job.cancel.is_cancelled() {
            return Err(SynthesisError::Internal(
                "job cancelled before submission".to_string(),
            ));
        }

        let jobs_tx = {
            let guard = self.jobs_tx.lock().expect("jobs lock poisoned");
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => {
                    return Err(SynthesisError::Internal("worker pool is closed".to_string()))
                }
            }
        };

        self.metrics.record_submitted();

        let job = match jobs_tx.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => {
                return Err(SynthesisError::Internal("worker pool is closed".to_string()));
            }
            Err(TrySendError::Full(job)) => job,
        };

        tracing::warn!(
            capacity = self.queue_capacity,
            "Job queue is full, blocking submission"
        );

        let job_cancel = job.cancel.clone();
        tokio::select! {
            sent = jobs_tx.send(job) => {
                sent.map_err(|_| SynthesisError::Internal("worker pool is closed".to_string()))
            }
            _ = self.cancel.cancelled() => {
                Err(SynthesisError::Internal("worker pool cancelled while waiting".to_string()))
            }
            _ = job_cancel.cancelled() => {
                Err(SynthesisError::Internal(
                    "job cancelled while waiting for submission".to_string(),
                ))
            }
        }
    }

    /// 取走结果接收端（只能取一次）
    pub fn take_results(&self) -> Option<mpsc::Receiver<SegmentResult>> {
        self.results_rx.lock().expect("results lock poisoned").take()
    }

    /// 关闭工作池
    ///
    /// 停止接收新任务、取消池级句柄、关闭任务队列，并在 10 秒
    /// 宽限时间内等待所有 worker 退出；幂等
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Worker pool already closed");
            return;
        }

        tracing::debug!("Closing worker pool");

        self.cancel.cancel();

        // 关闭任务队列
        *self.jobs_tx.lock().expect("jobs lock poisoned") = None;

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.handles.lock().expect("handles lock poisoned"));

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("Timeout waiting for workers to stop");
        }

        tracing::debug!("Worker pool closed");
    }

    /// 获取统计信息
    pub fn stats(&self) -> PoolStats {
        let total = self.metrics.total();
        let completed = self.metrics.completed();
        let queue_length = {
            let guard = self.jobs_tx.lock().expect("jobs lock poisoned");
            guard
                .as_ref()
                .map(|tx| tx.max_capacity() - tx.capacity())
                .unwrap_or(0)
        };

        PoolStats {
            total_jobs: total,
            completed_jobs: completed,
            failed_jobs: self.metrics.failed(),
            queue_length,
            success_rate: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_latency_ms: self.metrics.average_latency().as_millis() as f64,
        }
    }
}
