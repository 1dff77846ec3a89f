//! Audio Adapter
//!
//! MP3 片段合并：FFmpeg concat demuxer，不可用时退化为字节级拼接

mod ffmpeg_merger;

pub use ffmpeg_merger::FfmpegMerger;
