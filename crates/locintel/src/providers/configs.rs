use serde::{Deserialize, Serialize};

pub const OPEN_AI_DEFAULT_HOST: &str = "https://api.openai.com";
pub const OPEN_AI_DEFAULT_MODEL: &str = "gpt-5-mini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: OPEN_AI_DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            model: OPEN_AI_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}
