//! Foundational types for the flow automation engine.
//!
//! Every persisted type here is `Serialize + Deserialize + Debug + Clone`.
//! Map fields use `BTreeMap` (never `HashMap`) so serialized definitions and
//! executions are byte-stable, which the definition hash relies on.
//!
//! Raw definitions keep `node_type` / `trigger_type` as strings and configs
//! as JSON so that the validator can report unknown kinds and incomplete
//! configs as errors instead of failing deserialization. The typed views
//! ([`NodeSpec`], [`TriggerSpec`]) are produced by parsing.

pub mod execution;
pub mod graph;
pub mod nodes;
pub mod triggers;

pub use execution::*;
pub use graph::*;
pub use nodes::*;
pub use triggers::*;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Current schema version for FlowDefinition serialization.
pub const DEFINITION_SCHEMA_VERSION: u16 = 1;

/// Variable key that marks a test run.
pub const TEST_MODE_VARIABLE: &str = "testMode";

/// Variable key under which the contact snapshot is stored.
pub const CONTACT_VARIABLE: &str = "contact";

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Retry policy with exponential backoff, used by HttpRequest and AiChatbot
/// nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryPolicy {
    /// Total attempts (1 = no retry). Default: 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff in milliseconds. Default: 1 000.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Backoff multiplier per attempt. Default: 2.0.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.saturating_sub(1).min(16) as i32;
        let millis = self.backoff_ms as f64 * self.backoff_multiplier.max(1.0).powi(exp);
        std::time::Duration::from_millis(millis as u64)
    }

    /// Attempts actually made; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}
fn default_backoff_ms() -> u64 {
    1_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Normalize a kind name so `SendMessage`, `send_message` and `send-message`
/// compare equal.
pub(crate) fn normalize_kind(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.backoff_ms, 1_000);
        assert!((p.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_policy_backoff_grows() {
        let p = RetryPolicy {
            max_attempts: 4,
            backoff_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(p.backoff_after(1).as_millis(), 100);
        assert_eq!(p.backoff_after(2).as_millis(), 200);
        assert_eq!(p.backoff_after(3).as_millis(), 400);
    }

    #[test]
    fn zero_attempts_means_one() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(p.attempts(), 1);
    }

    #[test]
    fn kind_normalization() {
        assert_eq!(normalize_kind("SendMessage"), "sendmessage");
        assert_eq!(normalize_kind("send_message"), "sendmessage");
        assert_eq!(normalize_kind("send-message"), "sendmessage");
    }
}
