//! Engine configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "NURTURE_FLOW_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Tunables for the executor and the resume scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on node transitions per start/resume invocation.
    pub step_limit: u32,
    pub scheduler_interval_ms: u64,
    /// Lifetime of a scheduler claim or a worker lease.
    pub claim_ttl_secs: u64,
    /// Max due executions fetched per scheduler tick.
    pub scan_batch_size: usize,
    pub max_concurrent_resumes: usize,
    pub http_timeout_ms: u64,
    pub ai_timeout_ms: u64,
    /// Conversation turns sent to the AI provider.
    pub ai_context_window: usize,
    /// Used when a flow does not set its own window. 0 disables continuation.
    pub default_continuation_window_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_limit: 10_000,
            scheduler_interval_ms: 1_000,
            claim_ttl_secs: 300,
            scan_batch_size: 100,
            max_concurrent_resumes: 8,
            http_timeout_ms: 30_000,
            ai_timeout_ms: 60_000,
            ai_context_window: 10,
            default_continuation_window_secs: 0,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NURTURE_FLOW_*` variables, e.g.
    /// `NURTURE_FLOW_STEP_LIMIT=500`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        override_with(&lookup, "STEP_LIMIT", &mut config.step_limit)?;
        override_with(&lookup, "SCHEDULER_INTERVAL_MS", &mut config.scheduler_interval_ms)?;
        override_with(&lookup, "CLAIM_TTL_SECS", &mut config.claim_ttl_secs)?;
        override_with(&lookup, "SCAN_BATCH_SIZE", &mut config.scan_batch_size)?;
        override_with(&lookup, "MAX_CONCURRENT_RESUMES", &mut config.max_concurrent_resumes)?;
        override_with(&lookup, "HTTP_TIMEOUT_MS", &mut config.http_timeout_ms)?;
        override_with(&lookup, "AI_TIMEOUT_MS", &mut config.ai_timeout_ms)?;
        override_with(&lookup, "AI_CONTEXT_WINDOW", &mut config.ai_context_window)?;
        override_with(
            &lookup,
            "DEFAULT_CONTINUATION_WINDOW_SECS",
            &mut config.default_continuation_window_secs,
        )?;
        Ok(config)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms.max(1))
    }

    pub fn claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(i64::try_from(self.claim_ttl_secs).unwrap_or(i64::MAX))
            .unwrap_or(chrono::Duration::MAX)
    }

    /// How often a worker pushes its lease forward while a step is running:
    /// a third of the lease, never under 50ms.
    pub fn lease_renewal_interval(&self) -> Duration {
        (Duration::from_secs(self.claim_ttl_secs) / 3).max(Duration::from_millis(50))
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    suffix: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let key = format!("{ENV_PREFIX}{suffix}");
    if let Some(raw) = lookup(&key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.clone(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.step_limit, 10_000);
        assert_eq!(c.claim_ttl_secs, 300);
        assert_eq!(c.default_continuation_window_secs, 0);
        assert_eq!(c.lease_renewal_interval(), Duration::from_secs(100));
    }

    #[test]
    fn lease_renewal_has_a_floor() {
        let c = EngineConfig {
            claim_ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(c.lease_renewal_interval(), Duration::from_millis(50));
        assert!(EngineConfig {
            claim_ttl_secs: u64::MAX,
            ..Default::default()
        }
        .claim_ttl() > chrono::Duration::days(365));
    }

    #[test]
    fn lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NURTURE_FLOW_STEP_LIMIT", "50"),
            ("NURTURE_FLOW_AI_CONTEXT_WINDOW", " 4 "),
        ]
        .into_iter()
        .collect();
        let c = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.step_limit, 50);
        assert_eq!(c.ai_context_window, 4);
        assert_eq!(c.http_timeout_ms, 30_000);
    }

    #[test]
    fn invalid_value_is_an_error() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "NURTURE_FLOW_CLAIM_TTL_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("NURTURE_FLOW_CLAIM_TTL_SECS"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let c: EngineConfig = serde_json::from_str(r#"{"step_limit": 3}"#).unwrap();
        assert_eq!(c.step_limit, 3);
        assert_eq!(c.scan_batch_size, 100);
    }
}
