use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Bounded retries with exponential backoff, applied identically to every model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first call.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps; used when latency matters more than politeness.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Build a policy from human-readable durations such as `200ms` or `5s`.
    pub fn parse(max_retries: u32, initial_backoff: &str, max_backoff: &str) -> Result<Self> {
        let parse = |label: &str, raw: &str| {
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("invalid {label} `{raw}`"))
        };
        let initial_backoff = parse("initial_backoff", initial_backoff)?;
        let max_backoff = parse("max_backoff", max_backoff)?;
        anyhow::ensure!(
            initial_backoff <= max_backoff,
            "initial_backoff ({}) exceeds max_backoff ({})",
            humantime::format_duration(initial_backoff),
            humantime::format_duration(max_backoff)
        );
        Ok(Self {
            max_retries,
            initial_backoff,
            max_backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based): initial, 2x, 4x, ... capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.backoff(3), Duration::ZERO);
        assert_eq!(policy.max_attempts(), 5);
    }

    #[test]
    fn parses_humantime_durations() {
        let policy = RetryPolicy::parse(3, "250ms", "2s").unwrap();
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_retries, 3);

        assert!(RetryPolicy::parse(1, "soon", "2s").is_err());
        assert!(RetryPolicy::parse(1, "10s", "2s").is_err());
    }
}
