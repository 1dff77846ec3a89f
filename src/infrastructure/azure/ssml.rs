//! SSML 构建
//!
//! Markdown 符号清理、文本节点转义与 SSML 模板包装

/// SSML 模板
///
/// 与上游约定的固定外壳：express-as 控制风格，prosody 控制语速语调
const SSML_TEMPLATE: &str = r#"<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xmlns:mstts="http://www.w3.org/2001/mstts" xml:lang='{locale}'>
    <voice name='{voice}'>
        <mstts:express-as style="{style}" styledegree="1.0" role="default">
            <prosody rate='{rate}%' pitch='{pitch}%' volume="medium">
                {content}
            </prosody>
        </mstts:express-as>
    </voice>
</speak>"#;

/// 包装 SSML 文档
///
/// `content` 必须已经完成文本节点转义
pub fn build_ssml(
    locale: &str,
    voice: &str,
    style: &str,
    rate: &str,
    pitch: &str,
    content: &str,
) -> String {
    SSML_TEMPLATE
        .replace("{locale}", locale)
        .replace("{voice}", voice)
        .replace("{style}", style)
        .replace("{rate}", rate)
        .replace("{pitch}", pitch)
        .replace("{content}", content)
}

/// 从语音名提取 locale
///
/// 取前两个 `-` 分隔的部分（如 zh-CN-XiaoxiaoNeural -> zh-CN），
/// 不足两段时回退到 zh-CN
pub fn extract_locale(voice: &str) -> String {
    let parts: Vec<&str> = voice.split('-').collect();
    if parts.len() >= 2 {
        format!("{}-{}", parts[0], parts[1])
    } else {
        "zh-CN".to_string()
    }
}

/// 移除文本中常见的 Markdown 标记
pub fn strip_markdown(text: &str) -> String {
    text.replace("**", "")
        .replace('*', "")
        .replace('#', "")
        .replace('>', "")
        .replace('~', "")
}

/// 对文本节点进行 XML 转义，标签原样通过
///
/// 宽容式扫描：`<...>` 视作标签整体保留（允许预先构造的 SSML 片段
/// 直接穿透），标签之外的文本转义 XML 特殊字符。没有配对 `>` 的
/// 孤立 `<` 按文本处理。
pub fn escape_text_nodes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('<') {
        escape_into(&mut out, &rest[..open]);

        match rest[open..].find('>') {
            Some(close) => {
                // 标签原样保留
                out.push_str(&rest[open..open + close + 1]);
                rest = &rest[open + close + 1..];
            }
            None => {
                // 孤立的 '<'，整段按文本处理
                escape_into(&mut out, &rest[open..]);
                rest = "";
            }
        }
    }

    escape_into(&mut out, rest);
    out
}

/// 转义 XML 特殊字符
fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_locale() {
        assert_eq!(extract_locale("zh-CN-XiaoxiaoNeural"), "zh-CN");
        assert_eq!(extract_locale("en-US-AriaNeural"), "en-US");
        assert_eq!(extract_locale("weird"), "zh-CN");
        assert_eq!(extract_locale(""), "zh-CN");
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(strip_markdown("**bold** and *italic*"), "bold and italic");
        assert_eq!(strip_markdown("# Title\n> quote ~x~"), " Title\n quote x");
        assert_eq!(strip_markdown("plain text"), "plain text");
    }

    #[test]
    fn test_escape_plain_text() {
        assert_eq!(
            escape_text_nodes("Tom & Jerry \"quoted\""),
            "Tom &amp; Jerry &quot;quoted&quot;"
        );
    }

    #[test]
    fn test_tags_pass_through_unchanged() {
        let input = r#"<break time="500ms"/>停顿之后 & 继续"#;
        assert_eq!(
            escape_text_nodes(input),
            r#"<break time="500ms"/>停顿之后 &amp; 继续"#
        );
    }

    #[test]
    fn test_text_between_tags_escaped() {
        let input = "5 > 3 & <b>x</b>";
        assert_eq!(escape_text_nodes(input), "5 &gt; 3 &amp; <b>x</b>");
    }

    #[test]
    fn test_lone_open_bracket_escaped() {
        assert_eq!(escape_text_nodes("1 < 2"), "1 &lt; 2");
    }

    #[test]
    fn test_build_ssml_shape() {
        let ssml = build_ssml("zh-CN", "zh-CN-XiaoxiaoNeural", "general", "+10", "0", "你好");
        assert!(ssml.contains("xml:lang='zh-CN'"));
        assert!(ssml.contains("<voice name='zh-CN-XiaoxiaoNeural'>"));
        assert!(ssml.contains(r#"style="general""#));
        assert!(ssml.contains("rate='+10%'"));
        assert!(ssml.contains("pitch='0%'"));
        assert!(ssml.contains("你好"));
    }
}
