use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LanguageModel, LlmError, Prompt};
use crate::error::ConfigError;

pub const API_KEY_VAR: &str = "LLM_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Client for OpenAI-compatible chat completion servers.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn from_env(model: Option<&str>, timeout: Duration) -> Result<Self, ConfigError> {
        let api_key = dotenv::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(API_KEY_VAR))?;
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = model
            .map(str::to_string)
            .or_else(|| dotenv::var("LLM_MODEL").ok())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Self::new(api_key, base_url, model, timeout)
    }

    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let messages = [
            Message {
                role: "system".to_string(),
                content: prompt.system.clone(),
            },
            Message {
                role: "user".to_string(),
                content: prompt.user_content(),
            },
        ];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": 2048,
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| LlmError::ResponseFormat {
                message: e.to_string(),
                raw_response: text.clone(),
            })?;

        // choices[0].message.content (null when the model refused)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        Ok(content)
    }
}
