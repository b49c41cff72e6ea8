//! HttpRequest: outbound call with timeout, retry and an optional
//! `error` edge.

use std::time::Duration;

use serde_json::{json, Value};

use super::{with_retry, Attempt};
use crate::executor::edges::ERROR_LABEL;
use crate::executor::{StepCtx, StepOutcome};
use crate::template;
use crate::traits::{HttpCall, HttpReply};
use crate::types::{FailureKind, HttpRequestConfig};

/// Variable holding the last failure when the `error` edge is taken.
pub(crate) const LAST_HTTP_ERROR: &str = "last_http_error";

pub(crate) async fn run(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &HttpRequestConfig) -> StepOutcome {
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }

    let vars = &ctx.exec.variables;
    let timeout = Duration::from_millis(cfg.timeout_ms.unwrap_or(ctx.config.http_timeout_ms));
    let call = HttpCall {
        method: cfg.method,
        url: template::render(&cfg.url, vars),
        headers: cfg
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), template::render(v, vars)))
            .collect(),
        body: cfg.body.as_ref().map(|b| template::render_value(b, vars)),
        timeout,
    };
    tracing::debug!(node_id = %node_id, method = %cfg.method.as_str(), url = %call.url, "http request");

    let caller = ctx.services.http.clone();
    let result = with_retry(node_id, &cfg.retry, timeout, || {
        let caller = caller.clone();
        let call = call.clone();
        async move { classify(caller.call(call).await) }
    })
    .await;

    match result {
        Ok(reply) => {
            ctx.note = Some(format!("HTTP {}", reply.status));
            if let Some(var) = &cfg.save_response_to {
                ctx.exec
                    .variables
                    .insert(var.clone(), json!({"status": reply.status, "body": reply.body}));
            }
            ctx.advance(node_id)
        }
        Err(exhausted) => {
            let message = format!(
                "{} after {} attempt(s)",
                exhausted.message, exhausted.attempts
            );
            if let Some(outcome) = ctx.follow(node_id, ERROR_LABEL) {
                tracing::warn!(node_id = %node_id, error = %message, "http request failed, taking error edge");
                ctx.exec
                    .variables
                    .insert(LAST_HTTP_ERROR.to_string(), Value::String(message.clone()));
                ctx.note = Some(format!("error: {message}"));
                return outcome;
            }
            StepOutcome::fail(FailureKind::HttpRequestFailed, message, node_id)
        }
    }
}

fn classify(result: Result<HttpReply, crate::errors::HttpCallError>) -> Attempt<HttpReply> {
    match result {
        Ok(reply) if reply.is_success() => Attempt::Done(reply),
        Ok(reply) if reply.is_retryable() => Attempt::Retry(format!("HTTP {}", reply.status)),
        Ok(reply) => Attempt::Fatal(format!("HTTP {}", reply.status)),
        Err(e) if e.is_retryable() => Attempt::Retry(e.to_string()),
        Err(e) => Attempt::Fatal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HttpCallError;

    fn reply(status: u16) -> Result<HttpReply, HttpCallError> {
        Ok(HttpReply {
            status,
            body: Value::Null,
        })
    }

    #[test]
    fn classification() {
        assert!(matches!(classify(reply(200)), Attempt::Done(_)));
        assert!(matches!(classify(reply(503)), Attempt::Retry(m) if m == "HTTP 503"));
        assert!(matches!(classify(reply(429)), Attempt::Retry(_)));
        assert!(matches!(classify(reply(404)), Attempt::Fatal(m) if m == "HTTP 404"));
        assert!(matches!(
            classify(Err(HttpCallError::Transport {
                message: "reset".into()
            })),
            Attempt::Retry(_)
        ));
        assert!(matches!(
            classify(Err(HttpCallError::InvalidRequest {
                message: "bad url".into()
            })),
            Attempt::Fatal(_)
        ));
    }
}
