use super::{LlmClient, LlmError, LlmSettings};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// One Gemini model reached through the `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(settings: &LlmSettings, model: &str) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("Gemini API key must be provided via WORKSPACE_CLEANUP_API_KEY or GEMINI_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            model
        );
        let http = Client::builder()
            .user_agent(concat!("workspace-cleanup/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let payload = GeminiRequest {
            contents: vec![GeminiRequestContent {
                role: "user".into(),
                parts: vec![GeminiRequestPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.1 },
        };

        let response = self
            .http
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status,
                body: super::truncate(&body, 500),
            });
        }

        let message: GeminiResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Malformed(format!("unexpected Gemini envelope: {err}")))?;
        let content = message
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiRequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiRequestContent {
    role: String,
    parts: Vec<GeminiRequestPart>,
}

#[derive(Serialize)]
struct GeminiRequestPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_settings(url: String) -> LlmSettings {
        LlmSettings {
            provider: ProviderKind::Gemini,
            api_key: "test-key".into(),
            endpoint: Some(url),
            models: vec!["gemini-test".into()],
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn builder_requires_api_key() {
        let mut settings = base_settings("https://example.com".into());
        settings.api_key.clear();
        let err = GeminiClient::new(&settings, "gemini-test").unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn builder_targets_model_url() {
        let settings = base_settings("https://example.com/".into());
        let client = GeminiClient::new(&settings, "gemini-test").unwrap();
        assert_eq!(
            client.url,
            "https://example.com/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(client.model_id(), "gemini-test");
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn complete_joins_candidate_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent")
                .query_param("key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [
                        {
                            "content": {
                                "role": "model",
                                "parts": [
                                    {"text": "[{\"email\":\"a@example.com\","},
                                    {"text": "\"classification\":\"SafeToKeep\"}]"}
                                ]
                            }
                        }
                    ]
                }));
        });

        let client = GeminiClient::new(&base_settings(server.base_url()), "gemini-test").unwrap();
        let text = client.complete("hello").await.unwrap();
        assert_eq!(
            text,
            "[{\"email\":\"a@example.com\",\"classification\":\"SafeToKeep\"}]"
        );
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn rate_limit_surfaces_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-test:generateContent");
            then.status(429).body("quota exceeded");
        });

        let client = GeminiClient::new(&base_settings(server.base_url()), "gemini-test").unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 429, .. }));
        assert!(err.is_retryable());
        mock.assert_hits(1);
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn empty_candidates_are_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"candidates": []}));
        });

        let client = GeminiClient::new(&base_settings(server.base_url()), "gemini-test").unwrap();
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
