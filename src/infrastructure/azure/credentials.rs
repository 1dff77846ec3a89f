//! 凭证缓存
//!
//! 从发现端点获取短期 bearer token，带安全边际地缓存与刷新。
//! 刷新为 single-flight：并发调用方不会触发多次刷新请求。

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::application::error::SynthesisError;

/// 过期安全边际：到期前 60 秒即视为过期
const SAFETY_MARGIN_SECS: i64 = 60;

const USER_AGENT: &str = "okhttp/4.5.0";

/// 上游凭证
#[derive(Debug, Clone)]
pub struct Credential {
    /// bearer token（直接用于 Authorization 头）
    pub token: String,
    /// 上游区域，如 eastasia
    pub region: String,
    /// 已扣除安全边际的过期时间
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// 凭证在 `now` 时刻是否仍然有效
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// 发现端点响应
///
/// `t` 为 JWT token，`r` 为区域
#[derive(Debug, Deserialize)]
struct EndpointResponse {
    t: String,
    r: String,
}

/// 凭证缓存
///
/// 读写锁保护缓存值，刷新互斥锁保证 single-flight
pub struct CredentialCache {
    http: Client,
    endpoint_url: String,
    current: RwLock<Option<Credential>>,
    refresh_gate: Mutex<()>,
}

impl CredentialCache {
    pub fn new(http: Client, endpoint_url: impl Into<String>) -> Self {
        Self {
            http,
            endpoint_url: endpoint_url.into(),
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// 获取有效凭证，必要时刷新
    ///
    /// 绝不返回已过期（含安全边际）的凭证
    pub async fn fetch(&self) -> Result<Credential, SynthesisError> {
        let now = Utc::now();

        // 快速路径：读锁检查缓存
        {
            let guard = self.current.read().await;
            if let Some(cred) = guard.as_ref() {
                if cred.is_fresh(now) {
                    return Ok(cred.clone());
                }
            }
        }

        // 刷新路径：single-flight，拿到闸锁后二次检查
        let _gate = self.refresh_gate.lock().await;
        {
            let guard = self.current.read().await;
            if let Some(cred) = guard.as_ref() {
                if cred.is_fresh(Utc::now()) {
                    return Ok(cred.clone());
                }
            }
        }

        let cred = self.refresh().await?;
        *self.current.write().await = Some(cred.clone());
        Ok(cred)
    }

    /// 作废当前凭证（上游明确拒绝时由客户端调用）
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
        tracing::warn!("Credential invalidated by upstream rejection");
    }

    /// 执行一次刷新请求
    async fn refresh(&self) -> Result<Credential, SynthesisError> {
        tracing::debug!(url = %self.endpoint_url, "Refreshing upstream credential");

        let response = self
            .http
            .get(&self.endpoint_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| SynthesisError::UpstreamNetwork(format!("endpoint request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::UpstreamNetwork(format!(
                "endpoint status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let endpoint: EndpointResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::UpstreamNetwork(format!("endpoint parse: {}", e)))?;

        let exp = extract_jwt_exp(&endpoint.t).ok_or_else(|| {
            SynthesisError::UpstreamNetwork("jwt missing exp claim".to_string())
        })?;

        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| SynthesisError::UpstreamNetwork("jwt exp out of range".to_string()))?
            - Duration::seconds(SAFETY_MARGIN_SECS);

        tracing::info!(
            region = %endpoint.r,
            expires_at = %expires_at,
            "Credential refreshed"
        );

        Ok(Credential {
            token: endpoint.t,
            region: endpoint.r,
            expires_at,
        })
    }
}

/// 从 JWT 中解析 exp 声明
///
/// 只解码 payload 段，不做签名校验（token 对网关是不透明的）
fn extract_jwt_exp(jwt: &str) -> Option<i64> {
    let payload = jwt.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("exp")?.as_i64()
}
