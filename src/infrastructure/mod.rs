//! Infrastructure Layer
//!
//! 端口的具体实现与对外 HTTP 服务

pub mod audio;
pub mod azure;
pub mod cache;
pub mod http;
pub mod memory;
pub mod pipeline;
