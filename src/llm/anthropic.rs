use std::time::Duration;

use async_trait::async_trait;

use super::{LanguageModel, LlmError, Prompt};
use crate::error::ConfigError;

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_env(model: Option<&str>, timeout: Duration) -> Result<Self, ConfigError> {
        let api_key = dotenv::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(API_KEY_VAR))?;
        let base_url =
            dotenv::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = model
            .map(str::to_string)
            .or_else(|| dotenv::var("LLM_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

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
            max_tokens: 4096,
        })
    }

    /// Resolve the messages endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1/messages") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/messages", base)
        } else {
            format!("{}/v1/messages", base)
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0.3,
            "system": prompt.system,
            "messages": [{ "role": "user", "content": prompt.user_content() }],
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

        // content: [{"type": "text", "text": "..."}, ...]
        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| LlmError::ResponseFormat {
                message: "missing content blocks".to_string(),
                raw_response: text.clone(),
            })?;

        Ok(content)
    }
}
