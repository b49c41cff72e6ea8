//! AddTag, RemoveTag and UpdateField: contact mutations.
//!
//! Each write goes to the contact store first; the `contact` entry in the
//! execution variables is then patched so later steps see the change.

use serde_json::Value;

use crate::executor::{StepCtx, StepOutcome};
use crate::template;
use crate::types::{FailureKind, TagConfig, UpdateFieldConfig, CONTACT_VARIABLE};

pub(crate) async fn add_tag(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &TagConfig) -> StepOutcome {
    let tag_id = template::render(&cfg.tag_id, &ctx.exec.variables);
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }
    let result = ctx
        .services
        .contacts
        .add_tag(&ctx.exec.team_id, &ctx.exec.contact_id, &tag_id)
        .await;
    if let Err(e) = result {
        return StepOutcome::fail(FailureKind::ContactStoreFailed, e.to_string(), node_id);
    }
    if let Some(tags) = contact_tags(ctx) {
        if !tags.iter().any(|t| t.as_str() == Some(tag_id.as_str())) {
            tags.push(Value::String(tag_id));
        }
    }
    ctx.advance(node_id)
}

pub(crate) async fn remove_tag(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &TagConfig) -> StepOutcome {
    let tag_id = template::render(&cfg.tag_id, &ctx.exec.variables);
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }
    let result = ctx
        .services
        .contacts
        .remove_tag(&ctx.exec.team_id, &ctx.exec.contact_id, &tag_id)
        .await;
    if let Err(e) = result {
        return StepOutcome::fail(FailureKind::ContactStoreFailed, e.to_string(), node_id);
    }
    if let Some(tags) = contact_tags(ctx) {
        tags.retain(|t| t.as_str() != Some(tag_id.as_str()));
    }
    ctx.advance(node_id)
}

pub(crate) async fn update_field(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &UpdateFieldConfig) -> StepOutcome {
    let value = template::render_value(&cfg.value, &ctx.exec.variables);
    if ctx.test_mode() {
        ctx.skip();
        return ctx.advance(node_id);
    }
    let result = ctx
        .services
        .contacts
        .set_field(&ctx.exec.team_id, &ctx.exec.contact_id, &cfg.field, value.clone())
        .await;
    if let Err(e) = result {
        return StepOutcome::fail(FailureKind::ContactStoreFailed, e.to_string(), node_id);
    }
    let contact = ctx
        .exec
        .variables
        .entry(CONTACT_VARIABLE.to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    if let Value::Object(fields) = contact {
        fields.insert(cfg.field.clone(), value);
    }
    ctx.advance(node_id)
}

/// The `contact.tags` array, when the snapshot carried one.
fn contact_tags<'c>(ctx: &'c mut StepCtx<'_>) -> Option<&'c mut Vec<Value>> {
    ctx.exec
        .variables
        .get_mut(CONTACT_VARIABLE)?
        .get_mut("tags")?
        .as_array_mut()
}
