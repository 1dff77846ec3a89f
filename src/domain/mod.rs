//! Domain Layer
//!
//! 合成请求模型、文本分段、请求指纹

pub mod fingerprint;
pub mod segmenter;
pub mod speech;

pub use fingerprint::Fingerprint;
pub use segmenter::{FixedLengthSegmenter, SegmentationStrategy, SmartSegmenter};
pub use speech::{OpenAiSpeechRequest, SpeechRequest, SpeechResponse, Voice};
