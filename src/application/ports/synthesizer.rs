//! Synthesizer Port - 语音合成抽象
//!
//! 能力接口：上游客户端是基础实现，响应缓存与长文本编排
//! 均以包装另一个实现的方式组合（构造时注入，无运行时反射）

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::domain::speech::{SpeechRequest, SpeechResponse, Voice};

/// Synthesizer Port
///
/// 所有实现必须保证：响应要么是一个完整的 MP3 blob，要么是错误；
/// 不会出现部分字节
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// 执行语音合成
    ///
    /// `cancel` 为调用方的取消句柄，实现必须在所有阻塞点响应取消
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SpeechResponse, SynthesisError>;

    /// 获取可用语音列表，按 locale 前缀过滤（空表示不过滤）
    async fn list_voices(&self, locale: &str) -> Result<Vec<Voice>, SynthesisError>;
}
