//! Audio Merger Port - 音频合并抽象

use async_trait::async_trait;

use crate::application::error::SynthesisError;

/// Audio Merger Port
///
/// 将有序的 MP3 片段合并为一个连续的 MP3 流
#[async_trait]
pub trait AudioMerger: Send + Sync {
    /// 按输入顺序合并片段
    ///
    /// 空输入返回错误；单片段原样返回
    async fn merge(&self, segments: Vec<Vec<u8>>) -> Result<Vec<u8>, SynthesisError>;
}
