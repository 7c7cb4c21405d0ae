use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

use super::ProviderKind;

/// Values read from a config file. Environment variables take precedence over every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LlmOverrides {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub models: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Environment-driven configuration required for LLM adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub endpoint: Option<String>,
    /// Model identifiers in fallback order.
    pub models: Vec<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmSettings {
    pub const PROVIDER_ENV: &'static str = "WORKSPACE_CLEANUP_PROVIDER";
    pub const API_KEY_ENV: &'static str = "WORKSPACE_CLEANUP_API_KEY";
    pub const ENDPOINT_ENV: &'static str = "WORKSPACE_CLEANUP_ENDPOINT";
    pub const MODELS_ENV: &'static str = "WORKSPACE_CLEANUP_MODELS";
    pub const TIMEOUT_ENV: &'static str = "WORKSPACE_CLEANUP_TIMEOUT_SECS";
    pub const RETRIES_ENV: &'static str = "WORKSPACE_CLEANUP_MAX_RETRIES";

    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_RETRIES: u32 = 2;

    /// Load settings from environment variables.
    ///
    /// * `WORKSPACE_CLEANUP_PROVIDER` — `gemini` (default), `openai` or `noop`.
    /// * `WORKSPACE_CLEANUP_API_KEY`  — API key; falls back to `GEMINI_API_KEY`/`GOOGLE_API_KEY`
    ///   or `OPENAI_API_KEY`. Required unless the provider is `noop`.
    /// * `WORKSPACE_CLEANUP_MODELS`   — comma-separated models tried in order.
    pub fn from_env() -> Result<Self> {
        Self::resolve(&LlmOverrides::default())
    }

    /// Layer environment variables over values from a config file.
    pub fn resolve(file: &LlmOverrides) -> Result<Self> {
        Self::from_map(std::env::vars().collect(), file)
    }

    fn from_map(vars: HashMap<String, String>, file: &LlmOverrides) -> Result<Self> {
        let lookup = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider: ProviderKind = lookup(Self::PROVIDER_ENV)
            .or_else(|| file.provider.clone())
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or(ProviderKind::Gemini);

        let api_key = lookup(Self::API_KEY_ENV)
            .or_else(|| file.api_key.clone().filter(|v| !v.trim().is_empty()))
            .or_else(|| {
                provider
                    .fallback_key_vars()
                    .iter()
                    .find_map(|key| lookup(key))
            });
        let api_key = match provider {
            ProviderKind::Noop => api_key.unwrap_or_default(),
            _ => api_key.with_context(|| {
                format!(
                    "environment variable {} must be set for provider `{}` (or pass --no-ai)",
                    Self::API_KEY_ENV,
                    provider
                )
            })?,
        };

        let endpoint = lookup(Self::ENDPOINT_ENV).or_else(|| file.endpoint.clone());

        let models: Vec<String> = match lookup(Self::MODELS_ENV) {
            Some(raw) => raw
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            None => file.models.clone().unwrap_or_default(),
        };
        let models = if models.is_empty() {
            provider
                .default_models()
                .iter()
                .map(|m| m.to_string())
                .collect()
        } else {
            models
        };

        let timeout_secs = lookup(Self::TIMEOUT_ENV)
            .map(|v| {
                v.parse::<u64>().with_context(|| {
                    format!("{} must be a whole number of seconds, got `{v}`", Self::TIMEOUT_ENV)
                })
            })
            .transpose()?
            .or(file.timeout_secs)
            .unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        let max_retries = lookup(Self::RETRIES_ENV)
            .map(|v| {
                v.parse::<u32>().with_context(|| {
                    format!("{} must be a non-negative integer, got `{v}`", Self::RETRIES_ENV)
                })
            })
            .transpose()?
            .or(file.max_retries)
            .unwrap_or(Self::DEFAULT_MAX_RETRIES);

        Ok(Self {
            provider,
            api_key,
            endpoint,
            models,
            timeout_secs,
            max_retries,
        })
    }

    /// Settings that switch AI classification off entirely.
    pub fn disabled() -> Self {
        Self {
            provider: ProviderKind::Noop,
            api_key: String::new(),
            endpoint: None,
            models: Vec::new(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.provider != ProviderKind::Noop
    }
}
