//! AiChatbot: one completion turn with a bounded history window.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use super::{with_retry, Attempt};
use crate::errors::AiError;
use crate::executor::{StepCtx, StepOutcome};
use crate::template;
use crate::traits::{AiRequest, ChatRole, ChatTurn};
use crate::types::{AiChatbotConfig, FailureKind};

/// Variable carrying the running conversation across AiChatbot steps.
pub(crate) const AI_HISTORY: &str = "ai_history";

pub(crate) async fn run(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &AiChatbotConfig) -> StepOutcome {
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }
    let Some(provider) = ctx.services.ai.clone() else {
        return StepOutcome::fail(FailureKind::AiCompletionFailed, AiError::NotConfigured.to_string(), node_id);
    };

    let window = cfg.context_window.unwrap_or(ctx.config.ai_context_window);
    let mut history = read_history(&ctx.exec.variables);
    let user_turn = ChatTurn {
        role: ChatRole::User,
        content: template::render(&cfg.input, &ctx.exec.variables),
    };
    let mut messages = tail(&history, window);
    messages.push(user_turn.clone());

    let request = AiRequest {
        system_prompt: template::render(&cfg.system_prompt, &ctx.exec.variables),
        messages,
        model: cfg.model.clone(),
    };
    let timeout = Duration::from_millis(cfg.timeout_ms.unwrap_or(ctx.config.ai_timeout_ms));
    let result = with_retry(node_id, &cfg.retry, timeout, || {
        let provider = provider.clone();
        let request = request.clone();
        async move {
            match provider.complete(request).await {
                Ok(reply) => Attempt::Done(reply),
                Err(e @ AiError::NotConfigured) => Attempt::Fatal(e.to_string()),
                Err(e) => Attempt::Retry(e.to_string()),
            }
        }
    })
    .await;

    let reply = match result {
        Ok(reply) => reply,
        Err(exhausted) => {
            return StepOutcome::fail(
                FailureKind::AiCompletionFailed,
                format!("{} after {} attempt(s)", exhausted.message, exhausted.attempts),
                node_id,
            )
        }
    };
    tracing::debug!(node_id = %node_id, provider = %provider.name(), "ai reply received");

    history.push(user_turn);
    history.push(ChatTurn {
        role: ChatRole::Assistant,
        content: reply.clone(),
    });
    let kept = tail(&history, window);
    let vars = &mut ctx.exec.variables;
    vars.insert(cfg.output_variable.clone(), Value::String(reply));
    vars.insert(
        AI_HISTORY.to_string(),
        serde_json::to_value(kept).unwrap_or(Value::Array(Vec::new())),
    );
    ctx.advance(node_id)
}

/// Prior turns stored in the variables; malformed entries are dropped.
fn read_history(vars: &BTreeMap<String, Value>) -> Vec<ChatTurn> {
    vars.get(AI_HISTORY)
        .and_then(Value::as_array)
        .map(|turns| {
            turns
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn tail(turns: &[ChatTurn], window: usize) -> Vec<ChatTurn> {
    turns[turns.len().saturating_sub(window)..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_skips_malformed_turns() {
        let mut vars = BTreeMap::new();
        vars.insert(
            AI_HISTORY.to_string(),
            json!([{"role": "user", "content": "hi"}, {"oops": true}, {"role": "assistant", "content": "hello"}]),
        );
        let turns = read_history(&vars);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, ChatRole::Assistant);
    }

    #[test]
    fn tail_keeps_most_recent() {
        let turns: Vec<_> = (0..5)
            .map(|i| ChatTurn {
                role: ChatRole::User,
                content: i.to_string(),
            })
            .collect();
        let kept = tail(&turns, 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].content, "3");
        assert!(tail(&turns, 0).is_empty());
        assert_eq!(tail(&turns, 10).len(), 5);
    }
}
