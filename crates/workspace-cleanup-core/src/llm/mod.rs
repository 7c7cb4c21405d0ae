pub(crate) mod chain;
mod gemini;
mod openai;
mod retry;
mod settings;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chain::{AttemptFailure, ChainExhausted, ChainSuccess, ModelChain};
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;
pub use settings::{LlmOverrides, LlmSettings};

/// Client abstraction for a single named model endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Identifier of the model this endpoint talks to, used in logs and reports.
    fn model_id(&self) -> &str;

    /// Send a prompt and return the model's raw text answer.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Failure of a single model call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Client errors other than timeouts and rate limits will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            Self::Transport(_) | Self::EmptyResponse | Self::Malformed(_) => true,
        }
    }
}

/// Hosted model families the planner can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    OpenAi,
    /// AI classification switched off; every user stays unclassified.
    Noop,
}

impl ProviderKind {
    pub fn default_models(self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["gemini-2.5-flash", "gemini-2.0-flash"],
            Self::OpenAi => &["gpt-4o-mini", "gpt-4o"],
            Self::Noop => &[],
        }
    }

    /// Provider-specific variables consulted when the generic API key is unset.
    pub fn fallback_key_vars(self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Noop => &[],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Noop => "noop",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            "noop" | "none" | "off" => Ok(Self::Noop),
            other => bail!("unsupported LLM provider `{other}` (expected gemini, openai or noop)"),
        }
    }
}

/// Build one client per configured model, in fallback order.
pub fn build_endpoints(settings: &LlmSettings) -> Result<Vec<Arc<dyn LlmClient>>> {
    settings
        .models
        .iter()
        .map(|model| -> Result<Arc<dyn LlmClient>> {
            match settings.provider {
                ProviderKind::Gemini => Ok(Arc::new(GeminiClient::new(settings, model)?)),
                ProviderKind::OpenAi => Ok(Arc::new(OpenAiClient::new(settings, model)?)),
                ProviderKind::Noop => bail!("noop provider has no model endpoints"),
            }
        })
        .collect()
}

/// Trim surrounding whitespace and cap length, marking truncation with an ellipsis.
pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    let input = input.trim();
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}
