//! Voxgate - 长文本 TTS 网关
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 合成请求/响应模型、语音模型
//! - 文本分段器（智能分段 + 固定长度分段）
//! - 请求指纹（缓存 key）
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Synthesizer, AudioMerger, JobStore）
//! - 统一错误分类（上游状态码 + 错误消息启发式）
//! - 进程级指标
//!
//! 基础设施层 (infrastructure/):
//! - Azure: 上游 TTS 客户端 + 凭证缓存 + SSML 构建
//! - Pipeline: 分段工作池 + 长文本编排
//! - Audio: FFmpeg 音频合并（带字节级回退）
//! - Cache: 指纹响应缓存（TTL + 总大小上限淘汰）
//! - Memory: 内存异步任务存储
//! - HTTP: RESTful API + OpenAI 兼容接口

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
