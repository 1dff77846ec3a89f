//! FFmpeg 音频合并器
//!
//! 主路径：在临时目录写入片段文件与 concat 列表，调用
//! `ffmpeg -f concat -safe 0 -i concat.txt -c copy` 做无重编码拼接。
//! FFmpeg 不可用或执行失败时退化为字节级拼接（移除 ID3v2 标签），
//! 输出可能有可闻接缝。

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::application::error::SynthesisError;
use crate::application::ports::AudioMerger;

/// FFmpeg 合并器
pub struct FfmpegMerger {
    ffmpeg_path: String,
    /// 可用性探测结果，进程生命周期内缓存
    available: OnceCell<bool>,
}

impl FfmpegMerger {
    /// 创建合并器
    ///
    /// `ffmpeg_path` 为空时使用 PATH 中的 ffmpeg
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        let path = ffmpeg_path.into();
        Self {
            ffmpeg_path: if path.is_empty() {
                "ffmpeg".to_string()
            } else {
                path
            },
            available: OnceCell::new(),
        }
    }

    /// 探测 FFmpeg 是否可用（结果缓存）
    async fn ffmpeg_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let available = Command::new(&self.ffmpeg_path)
                    .arg("-version")
                    .output()
                    .await
                    .map(|out| out.status.success())
                    .unwrap_or(false);

                if available {
                    tracing::info!(path = %self.ffmpeg_path, "FFmpeg available");
                } else {
                    tracing::warn!(
                        path = %self.ffmpeg_path,
                        "FFmpeg not available, merges will fall back to byte concatenation"
                    );
                }
                available
            })
            .await
    }

    /// 使用 concat demuxer 合并
    async fn ffmpeg_merge(&self, segments: &[Vec<u8>]) -> Result<Vec<u8>, SynthesisError> {
        // 临时目录在函数返回时随 TempDir Drop 删除
        let work_dir = tempfile::Builder::new()
            .prefix("tts_merge_")
            .tempdir()
            .map_err(|e| SynthesisError::Internal(format!("create temp dir: {}", e)))?;

        let mut concat_list = String::new();
        for (i, segment) in segments.iter().enumerate() {
            let name = format!("seg_{:03}.mp3", i);
            let path = work_dir.path().join(&name);
            tokio::fs::write(&path, segment)
                .await
                .map_err(|e| SynthesisError::Internal(format!("write segment {}: {}", i, e)))?;
            concat_list.push_str(&format!("file '{}'\n", name));
        }

        let list_path = work_dir.path().join("concat.txt");
        tokio::fs::write(&list_path, concat_list)
            .await
            .map_err(|e| SynthesisError::Internal(format!("write concat list: {}", e)))?;

        let output_path = work_dir.path().join("output.mp3");
        let output = Command::new(&self.ffmpeg_path)
            .current_dir(work_dir.path())
            .args([
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                "concat.txt",
                "-c",
                "copy",
                "output.mp3",
            ])
            .output()
            .await
            .map_err(|e| SynthesisError::Internal(format!("spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::Internal(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.chars().take(300).collect::<String>()
            )));
        }

        let merged = tokio::fs::read(&output_path)
            .await
            .map_err(|e| SynthesisError::Internal(format!("read merged file: {}", e)))?;

        tracing::info!(
            segments = segments.len(),
            bytes = merged.len(),
            "Merged audio segments with ffmpeg"
        );
        Ok(merged)
    }

    /// 字节级拼接回退
    ///
    /// 移除每个片段的 ID3v2 标签；非首片段额外跳过前 512 字节的
    /// 疑似静音帧。尽力而为，可能产生可闻接缝。
    fn simple_merge(segments: &[Vec<u8>]) -> Vec<u8> {
        tracing::warn!(
            segments = segments.len(),
            "Using simple byte merge, output may contain audible seams"
        );

        const SKIP_BYTES: usize = 512;

        let mut merged = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let cleaned = strip_id3v2(segment);
            if i == 0 {
                merged.extend_from_slice(cleaned);
            } else if cleaned.len() > SKIP_BYTES {
                merged.extend_from_slice(&cleaned[SKIP_BYTES..]);
            } else {
                merged.extend_from_slice(cleaned);
            }
        }
        merged
    }
}

#[async_trait]
impl AudioMerger for FfmpegMerger {
    async fn merge(&self, segments: Vec<Vec<u8>>) -> Result<Vec<u8>, SynthesisError> {
        if segments.is_empty() {
            return Err(SynthesisError::Internal("no segments to merge".to_string()));
        }

        if segments.len() == 1 {
            return Ok(segments.into_iter().next().expect("len checked"));
        }

        if !self.ffmpeg_available().await {
            return Ok(Self::simple_merge(&segments));
        }

        match self.ffmpeg_merge(&segments).await {
            Ok(merged) => Ok(merged),
            Err(err) => {
                tracing::error!(error = %err, "FFmpeg merge failed, falling back to simple merge");
                Ok(Self::simple_merge(&segments))
            }
        }
    }
}

/// 移除 MP3 的 ID3v2 标签
///
/// 标签头为 "ID3"，大小在字节 6..10，使用同步安全整数编码；
/// 跳过 size + 10 字节的标签区
fn strip_id3v2(data: &[u8]) -> &[u8] {
    if data.len() < 10 {
        return data;
    }

    if &data[0..3] == b"ID3" {
        let size = ((data[6] as usize) << 21)
            | ((data[7] as usize) << 14)
            | ((data[8] as usize) << 7)
            | (data[9] as usize);
        let tag_size = size + 10;
        if tag_size < data.len() {
            return &data[tag_size..];
        }
    }

    data
}
