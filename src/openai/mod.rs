pub mod chat;
pub mod images;

pub use chat::{GenerationError, TextGenerator};
pub use images::{GeneratedImage, ImageGenerator};

use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoint and model selection for the OpenAI-compatible API. The key
/// itself lives in the persisted settings and is passed per run.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            text_model: std::env::var("OPENAI_TEXT_MODEL")
                .unwrap_or_else(|_| DEFAULT_TEXT_MODEL.into()),
            image_model: std::env::var("OPENAI_IMAGE_MODEL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.into()),
            timeout: MODEL_TIMEOUT,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            image_model: DEFAULT_IMAGE_MODEL.into(),
            timeout: MODEL_TIMEOUT,
        }
    }
}

/// `error.message` from an OpenAI error body, or `Unknown error`.
pub(crate) fn upstream_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".into())
}
