//! Job Store Port - 异步任务存储
//!
//! 定义异步合成任务的生命周期接口，具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务状态
///
/// 状态转换单调：processing -> {complete, error}，终态不再变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 处理中
    Processing,
    /// 合成完成，音频可取
    Complete,
    /// 合成失败
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// 异步合成任务
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// 自由格式进度文本（如 "5/19"），读取方不应解析
    pub progress: String,
    /// 合成完成后的音频数据
    pub audio: Option<Vec<u8>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job Store Port
///
/// 管理异步任务的生命周期，所有状态存储在内存中
pub trait JobStore: Send + Sync {
    /// 创建新任务（初始状态 processing）
    fn create(&self) -> Job;

    /// 获取任务
    fn get(&self, id: &str) -> Option<Job>;

    /// 更新任务进度
    fn set_progress(&self, id: &str, progress: &str);

    /// 标记任务完成并存储音频（终态转换，幂等失败返回 false）
    fn set_complete(&self, id: &str, audio: Vec<u8>) -> bool;

    /// 标记任务失败并记录错误消息
    fn set_error(&self, id: &str, message: &str) -> bool;
}
