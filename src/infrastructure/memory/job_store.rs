//! In-Memory Job Store
//!
//! 异步合成任务的内存存储：终态任务按 TTL 保留，
//! 超过 1 小时仍在 processing 的任务视为卡死被回收

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::application::ports::{Job, JobStatus, JobStore};

/// 卡死任务回收阈值
const STUCK_JOB_AGE: i64 = 3600;

/// 内存任务存储
pub struct InMemoryJobStore {
    /// job_id -> Job
    jobs: DashMap<String, Job>,
    /// 终态任务保留时间
    ttl: Duration,
    /// 清理间隔
    cleanup_interval: Duration,
}

impl InMemoryJobStore {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            ttl,
            cleanup_interval,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 启动后台清理任务
    pub fn spawn_reaper(self: Arc<Self>) {
        let store = self;
        let interval = store.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.cleanup();
            }
        });
    }

    /// 移除过期的终态任务与卡死的 processing 任务
    fn cleanup(&self) {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::zero());

        let stale: Vec<String> = self
            .jobs
            .iter()
            .filter(|job| {
                if let Some(completed_at) = job.completed_at {
                    return now - completed_at > ttl;
                }
                job.status == JobStatus::Processing
                    && now - job.created_at > ChronoDuration::seconds(STUCK_JOB_AGE)
            })
            .map(|job| job.key().clone())
            .collect();

        let count = stale.len();
        for id in stale {
            self.jobs.remove(&id);
        }

        if count > 0 {
            tracing::debug!(count, "Reaped stale jobs");
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self) -> Job {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Processing,
            progress: String::new(),
            audio: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.jobs.insert(job.id.clone(), job.clone());
        tracing::debug!(job_id = %job.id, "Job created");
        job
    }

    fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    fn set_progress(&self, id: &str, progress: &str) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            // 终态任务的进度不再更新
            if !job.status.is_terminal() {
                job.progress = progress.to_string();
            }
        }
    }

    fn set_complete(&self, id: &str, audio: Vec<u8>) -> bool {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                if job.status.is_terminal() {
                    tracing::warn!(job_id = %id, status = job.status.as_str(), "Ignoring terminal transition on finished job");
                    return false;
                }
                job.status = JobStatus::Complete;
                job.audio = Some(audio);
                job.progress = String::new();
                job.completed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    fn set_error(&self, id: &str, message: &str) -> bool {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                if job.status.is_terminal() {
                    tracing::warn!(job_id = %id, status = job.status.as_str(), "Ignoring terminal transition on finished job");
                    return false;
                }
                job.status = JobStatus::Error;
                job.error = Some(message.to_string());
                job.completed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}
