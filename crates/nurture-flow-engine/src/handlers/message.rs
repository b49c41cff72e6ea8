//! SendMessage: render and hand off to the messaging gateway.

use crate::executor::{StepCtx, StepOutcome};
use crate::template;
use crate::traits::OutboundMessage;
use crate::types::{FailureKind, SendMessageConfig};

pub(crate) async fn run(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &SendMessageConfig) -> StepOutcome {
    let content = template::render(&cfg.message, &ctx.exec.variables);
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }
    let message = OutboundMessage {
        team_id: ctx.exec.team_id.clone(),
        contact_id: ctx.exec.contact_id.clone(),
        flow_id: ctx.exec.flow_id.clone(),
        execution_id: ctx.exec.id.clone(),
        node_id: node_id.to_string(),
        content,
    };
    if let Err(e) = ctx.services.messaging.send(&message).await {
        return StepOutcome::fail(FailureKind::MessagingFailed, e.to_string(), node_id);
    }
    ctx.advance(node_id)
}
