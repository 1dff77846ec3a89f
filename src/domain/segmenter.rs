//! 文本分段器
//!
//! 将长文本切割为适合单次上游合成的片段，优先在句子边界切割

use regex::Regex;

/// 文本分段策略
pub trait SegmentationStrategy: Send + Sync {
    /// 将文本分段，每个片段不超过 `max_len` 个字符
    fn segment(&self, text: &str, max_len: usize) -> Vec<String>;
}

/// 智能分段器
///
/// 分段策略：
/// 1. 按段落分割（双换行符），跳过空段落
/// 2. 段落内按中英文句末标点分割（。！？；.!?; 连续出现视作一个边界）
/// 3. 贪心合并句子直到接近 `max_len`
/// 4. 超长句子按字符切割（保底策略）
pub struct SmartSegmenter {
    sentence_regex: Regex,
}

impl SmartSegmenter {
    pub fn new() -> Self {
        Self {
            sentence_regex: Regex::new(r"[。！？；.!\?;]+").expect("valid sentence regex"),
        }
    }

    /// 按句子分割文本，句子包含其结尾标点
    fn split_by_sentence<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut sentences = Vec::new();
        let mut last_end = 0;

        for mat in self.sentence_regex.find_iter(text) {
            let sentence = text[last_end..mat.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            last_end = mat.end();
        }

        // 最后一个句末标点之后的剩余文本
        if last_end < text.len() {
            let remaining = text[last_end..].trim();
            if !remaining.is_empty() {
                sentences.push(remaining);
            }
        }

        // 没有找到任何句末标点，整段视为一个句子
        if sentences.is_empty() {
            sentences.push(text);
        }

        sentences
    }

    /// 贪心合并句子，最大化利用长度限制
    fn merge_sentences(&self, sentences: &[&str], max_len: usize) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for sentence in sentences {
            let sentence_len = sentence.chars().count();

            // 单个句子超过最大长度，先保存累积片段再按字符切割
            if sentence_len > max_len {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                segments.extend(split_long_sentence(sentence, max_len));
                continue;
            }

            if current_len > 0 && current_len + sentence_len > max_len {
                segments.push(std::mem::take(&mut current));
                current.push_str(sentence);
                current_len = sentence_len;
            } else {
                current.push_str(sentence);
                current_len += sentence_len;
            }
        }

        if !current.is_empty() {
            segments.push(current);
        }

        segments
    }
}

impl Default for SmartSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationStrategy for SmartSegmenter {
    fn segment(&self, text: &str, max_len: usize) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        // 文本长度未超过限制，原样返回
        if text.chars().count() <= max_len {
            return vec![text.to_string()];
        }

        let mut segments = Vec::new();
        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            let sentences = self.split_by_sentence(para);
            segments.extend(self.merge_sentences(&sentences, max_len));
        }

        // 不应该发生：所有段落都为空时返回原文本
        if segments.is_empty() {
            return vec![text.to_string()];
        }

        segments
    }
}

/// 对超长句子进行字符级切割（保底策略）
fn split_long_sentence(sentence: &str, max_len: usize) -> Vec<String> {
    let runes: Vec<char> = sentence.chars().collect();
    runes
        .chunks(max_len)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// 固定长度分段器
///
/// 纯字符级切割，不考虑句子边界；拼接结果与原文完全一致
pub struct FixedLengthSegmenter;

impl FixedLengthSegmenter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FixedLengthSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationStrategy for FixedLengthSegmenter {
    fn segment(&self, text: &str, max_len: usize) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        split_long_sentence(text, max_len)
    }
}
