use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{LlmClient, LlmError, RetryPolicy};

/// A parsed answer together with the model that produced it.
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    pub model: String,
    pub value: T,
    /// Calls made across all endpoints, including the successful one.
    pub attempts: u32,
}

/// One failed call recorded while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub model: String,
    pub attempt: u32,
    pub error: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt {}: {}", self.model, self.attempt, self.error)
    }
}

/// Every endpoint in the chain failed.
#[derive(Debug, Clone, Error)]
#[error("all model endpoints failed after {} attempt(s); last error: {}", failures.len(), last_error(failures))]
pub struct ChainExhausted {
    pub failures: Vec<AttemptFailure>,
}

fn last_error(failures: &[AttemptFailure]) -> String {
    failures
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no model endpoints configured".into())
}

/// Ordered list of model endpoints tried in sequence, each under the same retry policy.
#[derive(Clone)]
pub struct ModelChain {
    endpoints: Vec<Arc<dyn LlmClient>>,
    policy: RetryPolicy,
}

impl fmt::Debug for ModelChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelChain")
            .field("models", &self.models())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ModelChain {
    pub fn new(endpoints: Vec<Arc<dyn LlmClient>>, policy: RetryPolicy) -> Self {
        Self { endpoints, policy }
    }

    pub fn models(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.model_id()).collect()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `prompt` down the chain until some endpoint returns text that `parse` accepts.
    ///
    /// Parse failures count as failed attempts, so a model that keeps answering in the
    /// wrong shape is retried and then abandoned like one that times out.
    pub async fn run<T, F>(&self, prompt: &str, parse: F) -> Result<ChainSuccess<T>, ChainExhausted>
    where
        F: Fn(&str) -> Result<T, LlmError>,
    {
        let mut failures = Vec::new();
        let mut calls = 0u32;

        for endpoint in &self.endpoints {
            let model = endpoint.model_id();
            for attempt in 1..=self.policy.max_attempts() {
                if attempt > 1 {
                    sleep(self.policy.backoff(attempt - 1)).await;
                }
                calls += 1;
                let result = endpoint
                    .complete(prompt)
                    .await
                    .and_then(|text| parse(&text));
                match result {
                    Ok(value) => {
                        debug!(model, attempt, "model call succeeded");
                        return Ok(ChainSuccess {
                            model: model.to_string(),
                            value,
                            attempts: calls,
                        });
                    }
                    Err(err) => {
                        let retryable = err.is_retryable();
                        warn!(model, attempt, retryable, error = %err, "model call failed");
                        failures.push(AttemptFailure {
                            model: model.to_string(),
                            attempt,
                            error: err.to_string(),
                        });
                        if !retryable {
                            break;
                        }
                    }
                }
            }
        }

        Err(ChainExhausted { failures })
    }
}
