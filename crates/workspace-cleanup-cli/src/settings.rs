use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use workspace_cleanup_core::risk::DEFAULT_FLAGGED_ROLES;
use workspace_cleanup_core::{CleanupPlanner, LlmOverrides, RetryPolicy, RiskCalculator, Session};

/// Contents of the optional `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmOverrides,
    pub planner: PlannerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub batch_size: usize,
    pub flagged_roles: Option<Vec<String>>,
    pub clamp_scores: bool,
    pub history_limit: usize,
    pub initial_backoff: String,
    pub max_backoff: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            batch_size: CleanupPlanner::DEFAULT_BATCH_SIZE,
            flagged_roles: None,
            clamp_scores: false,
            history_limit: Session::DEFAULT_RETENTION,
            initial_backoff: "200ms".into(),
            max_backoff: "5s".into(),
        }
    }
}

impl PlannerConfig {
    pub fn calculator(&self, clamp_override: bool) -> Result<RiskCalculator> {
        let roles = match &self.flagged_roles {
            Some(roles) => roles.clone(),
            None => DEFAULT_FLAGGED_ROLES.iter().map(|r| r.to_string()).collect(),
        };
        RiskCalculator::new(roles, self.clamp_scores || clamp_override)
    }

    pub fn retry_policy(&self, max_retries: u32) -> Result<RetryPolicy> {
        RetryPolicy::parse(max_retries, &self.initial_backoff, &self.max_backoff)
            .context("invalid [planner] backoff settings")
    }
}

/// Load the config file if one was given; the format follows the file extension.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    settings
        .try_deserialize()
        .with_context(|| format!("invalid config file {}", path.display()))
}
