use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// Fatal errors surfaced before any race is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing credential: set {0} in the environment or .env")]
    MissingCredential(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed ballot {path}: {source}")]
    MalformedBallot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ballot: {0}")]
    InvalidBallot(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Per-candidate search failure. Absorbed by the orchestrator.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("search provider unreachable: {0}")]
    Unreachable(String),

    #[error("search provider returned HTTP {0}")]
    Status(u16),

    #[error("malformed search response: {0}")]
    Malformed(String),

    #[error("search timed out after {0}s")]
    Timeout(u64),
}

impl RetrievalError {
    /// Whether a single retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Unreachable(_) | RetrievalError::Timeout(_) => true,
            RetrievalError::Status(code) => *code == 202 || *code == 429 || *code >= 500,
            RetrievalError::Malformed(_) => false,
        }
    }
}

/// Per-candidate summarization failure. Absorbed by the orchestrator.
#[derive(Error, Debug)]
pub enum SummarizationError {
    #[error("language model failed: {0}")]
    Model(#[from] LlmError),

    #[error("model returned no usable issues")]
    NoIssues,
}

/// Per-race failure. Aborts the current race only.
#[derive(Error, Debug)]
pub enum RecommendationError {
    #[error("language model unavailable: {0}")]
    Model(#[from] LlmError),
}
