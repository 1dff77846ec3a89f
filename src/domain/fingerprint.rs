//! 请求指纹
//!
//! 基于归一化请求参数的稳定哈希，用作响应缓存的 key

use sha2::{Digest, Sha256};

use super::speech::SpeechRequest;

/// 请求指纹
///
/// 对 (mode, content, voice, rate, pitch, style, format) 的有序组合取
/// SHA-256。所有字段先 trim 再转小写；`format` 必须在哈希前填充为
/// 生效格式（请求指定值或默认值）。
///
/// 注意：SSML 内容同样会被小写化，标签大小写不同的文档会得到相同
/// 指纹；两个指纹相同的请求必须产生字节一致的音频。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// 计算请求指纹
    ///
    /// # 参数
    /// - `req` - 合成请求
    /// - `effective_format` - 生效的输出格式（请求值或默认值）
    pub fn new(req: &SpeechRequest, effective_format: &str) -> Self {
        let mode = if req.is_ssml() { "ssml" } else { "text" };

        let mut hasher = Sha256::new();
        hasher.update(b"mode:");
        hasher.update(mode.as_bytes());
        hasher.update(b"|content:");
        hasher.update(normalize(req.content()).as_bytes());
        hasher.update(b"|voice:");
        hasher.update(normalize(&req.voice).as_bytes());
        hasher.update(b"|rate:");
        hasher.update(normalize(&req.rate).as_bytes());
        hasher.update(b"|pitch:");
        hasher.update(normalize(&req.pitch).as_bytes());
        hasher.update(b"|style:");
        hasher.update(normalize(&req.style).as_bytes());
        hasher.update(b"|format:");
        hasher.update(normalize(effective_format).as_bytes());

        let digest = hasher.finalize();
        Self(hex_encode(&digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 归一化参数值：去除前后空白并转小写
fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_request(text: &str, voice: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            voice: voice.to_string(),
            rate: "0".to_string(),
            pitch: "0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_requests_equal_fingerprints() {
        let a = Fingerprint::new(&text_request("Hello world", "en-US-A"), "fmt");
        let b = Fingerprint::new(&text_request("Hello world", "en-US-A"), "fmt");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalization_ignores_case_and_whitespace() {
        let a = Fingerprint::new(&text_request("  Hello World  ", "EN-us-a"), "FMT");
        let b = Fingerprint::new(&text_request("hello world", "en-us-a"), "fmt");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_differs() {
        let a = Fingerprint::new(&text_request("Hello", "en-US-A"), "fmt");
        let b = Fingerprint::new(&text_request("World", "en-US-A"), "fmt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_mode_distinguishes_text_and_ssml() {
        let text = text_request("<speak>hi</speak>", "v");
        let ssml = SpeechRequest {
            ssml: "<speak>hi</speak>".to_string(),
            voice: "v".to_string(),
            rate: "0".to_string(),
            pitch: "0".to_string(),
            ..Default::default()
        };
        assert_ne!(
            Fingerprint::new(&text, "fmt"),
            Fingerprint::new(&ssml, "fmt")
        );
    }

    #[test]
    fn test_format_affects_fingerprint() {
        let req = text_request("Hello", "v");
        assert_ne!(
            Fingerprint::new(&req, "audio-24khz-48kbitrate-mono-mp3"),
            Fingerprint::new(&req, "audio-16khz-32kbitrate-mono-mp3")
        );
    }

    #[test]
    fn test_hex_encoding_shape() {
        let fp = Fingerprint::new(&text_request("x", "v"), "fmt");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
