//! HTTP Handlers

mod jobs;
mod openai;
mod system;
mod tts;
mod voices;

pub use jobs::{job_result, job_status};
pub use openai::openai_speech;
pub use system::{health, metrics, reset_metrics};
pub use tts::{stream_get, stream_post, synthesize_get, synthesize_post};
pub use voices::list_voices;
