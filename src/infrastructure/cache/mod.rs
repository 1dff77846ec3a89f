//! Response Cache
//!
//! 指纹化响应缓存：TTL 过期 + 总大小上限淘汰

mod caching;

pub use caching::{CacheStats, CachingConfig, CachingSynthesizer};
