//! Built-in node handlers.
//!
//! Each handler gets the step context and its typed config and returns a
//! [`StepOutcome`](crate::executor::StepOutcome). Handlers never persist
//! anything themselves; the step loop does.

pub(crate) mod ai_chatbot;
pub(crate) mod contact;
pub(crate) mod http;
pub(crate) mod message;
pub(crate) mod routing;
pub(crate) mod wait;

use std::future::Future;
use std::time::Duration;

use crate::types::RetryPolicy;

/// Result of one attempt at a retryable collaborator call.
pub(crate) enum Attempt<T> {
    Done(T),
    Retry(String),
    Fatal(String),
}

/// Final error after the retry budget is spent.
pub(crate) struct Exhausted {
    pub message: String,
    pub attempts: u32,
}

/// Run `op` up to `policy.attempts()` times, each bounded by `timeout`,
/// sleeping with exponential backoff between retryable failures. A timeout
/// counts as a retryable failure.
pub(crate) async fn with_retry<T, F, Fut>(
    node_id: &str,
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T, Exhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Attempt::Retry(format!("timed out after {}ms", timeout.as_millis())),
        };
        match outcome {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(message) if attempt < max_attempts => {
                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    node_id = %node_id,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %message,
                    "step call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Attempt::Retry(message) | Attempt::Fatal(message) => {
                return Err(Exhausted {
                    message,
                    attempts: attempt,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_ms: 1,
            backoff_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn retries_until_budget_spent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("n", &fast(3), Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Retry("boom".to_string()) }
        })
        .await;
        let err = result.err().expect("should exhaust");
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("n", &fast(5), Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Fatal("HTTP 404".to_string()) }
        })
        .await;
        assert_eq!(result.err().expect("fatal").attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_attempt() {
        let result: Result<(), _> = with_retry("n", &fast(2), Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Attempt::Done(())
        })
        .await;
        let err = result.err().expect("should time out");
        assert_eq!(err.attempts, 2);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn success_after_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry("n", &fast(3), Duration::from_secs(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Attempt::Retry("flaky".to_string())
                } else {
                    Attempt::Done(n)
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(1));
    }
}
