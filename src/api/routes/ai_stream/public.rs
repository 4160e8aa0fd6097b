//! Public types for the streaming completion API
use serde::{Deserialize, Serialize};

use crate::openai::Message;

pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// Body of `POST /api/ai-stream`. The relay is stateless so the
/// client sends the whole chat history every time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub prompt: String,
    pub chat_history: Vec<Message>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: &str, chat_history: Vec<Message>) -> Self {
        Self {
            prompt: prompt.to_string(),
            chat_history,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}
