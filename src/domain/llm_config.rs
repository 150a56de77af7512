use serde::{Deserialize, Serialize};

pub const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_MODEL: &str = "sonar-pro";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl LLMConfig {
    pub fn with_sampling(&self, max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
            ..self.clone()
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !key.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_url: PERPLEXITY_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: Some(800),
            temperature: Some(0.1),
            timeout_secs: 60,
        }
    }
}
