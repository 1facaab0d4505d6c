pub mod anthropic;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::ConfigError;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

/// Errors raised by a language-model provider.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("response format error: {message}")]
    ResponseFormat {
        message: String,
        raw_response: String,
    },
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Request(err.to_string())
    }
}

/// A prompt split into its three parts. Providers decide how to lay them out.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    /// Standing instructions (role, output contract).
    pub system: String,
    /// Evidence the model reasons over.
    pub context: String,
    /// What to produce from that evidence.
    pub task: String,
}

impl Prompt {
    /// Context followed by task, for providers with a single user turn.
    pub fn user_content(&self) -> String {
        if self.context.is_empty() {
            self.task.clone()
        } else {
            format!("{}\n\n{}", self.context, self.task)
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider/model identifier for logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, LlmError>;
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// Anthropic messages API (`ANTHROPIC_API_KEY`).
    Anthropic,
    /// Any OpenAI-compatible chat completions endpoint (`LLM_API_KEY`).
    #[value(name = "openai")]
    OpenAi,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Provider as ValueEnum>::from_str(s, true)
    }
}

/// Build the configured provider, failing fast when its credential is missing.
pub fn from_env(
    provider: Provider,
    model: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn LanguageModel>, ConfigError> {
    Ok(match provider {
        Provider::Anthropic => Arc::new(AnthropicClient::from_env(model, timeout)?),
        Provider::OpenAi => Arc::new(OpenAiClient::from_env(model, timeout)?),
    })
}

/// Run `generate` under a deadline.
pub async fn generate_with_timeout(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    timeout: Duration,
) -> Result<String, LlmError> {
    debug!(model = model.name(), prompt_len = prompt.user_content().len(), "─── LLM Request ───");
    let response = tokio::time::timeout(timeout, model.generate(prompt))
        .await
        .map_err(|_| LlmError::Timeout(timeout.as_secs()))??;

    debug!(response_len = response.len(), "─── LLM Response ───");
    for line in response.lines().take(40) {
        debug!("  │ {}", line);
    }
    Ok(response)
}

/// Prompt in, typed value out.
pub async fn generate_structured<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    timeout: Duration,
) -> Result<T, LlmError> {
    let raw = generate_with_timeout(model, prompt, timeout).await?;
    parse_structured(&raw)
}

/// Deserialize the JSON object embedded in a model response.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let json = extract_json(raw).ok_or_else(|| LlmError::ResponseFormat {
        message: "no JSON object in response".to_string(),
        raw_response: raw.to_string(),
    })?;
    serde_json::from_str(json).map_err(|e| LlmError::ResponseFormat {
        message: e.to_string(),
        raw_response: raw.to_string(),
    })
}

/// Locate a JSON object: a ```json fence first, else the outermost braces.
fn extract_json(input: &str) -> Option<&str> {
    if let Some(start) = input.find("```json") {
        let after = &input[start + "```json".len()..];
        let end = after.find("```").unwrap_or(after.len());
        let body = after[..end].trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }

    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&input[start..=end])
}
