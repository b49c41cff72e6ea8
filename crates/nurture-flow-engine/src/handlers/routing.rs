//! Condition and Branch: pure routing over the variable map.

use crate::executor::edges;
use crate::condition::evaluate_rules;
use crate::executor::{StepCtx, StepOutcome};
use crate::types::{BranchConfig, ConditionConfig, FailureKind};

/// Follow the `true` or `false` edge.
pub(crate) fn condition(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &ConditionConfig) -> StepOutcome {
    let passed = evaluate_rules(&cfg.rules, cfg.logical_operator, &ctx.exec.variables);
    let label = if passed { "true" } else { "false" };
    ctx.note = Some(format!("condition {label}"));
    ctx.follow(node_id, label).unwrap_or_else(|| {
        StepOutcome::fail(
            FailureKind::MalformedNodeConfig,
            format!("no outgoing edge labeled '{label}'"),
            node_id,
        )
    })
}

/// First arm whose rules hold and whose label has an edge; otherwise the
/// default path.
pub(crate) fn branch(ctx: &mut StepCtx<'_>, node_id: &str, cfg: &BranchConfig) -> StepOutcome {
    for arm in &cfg.branches {
        if !evaluate_rules(&arm.rules, arm.logical_operator, &ctx.exec.variables) {
            continue;
        }
        if let Some(outcome) = ctx.follow(node_id, &arm.label) {
            ctx.note = Some(format!("branch {}", arm.label));
            return outcome;
        }
        tracing::debug!(node_id = %node_id, label = %arm.label, "matching arm has no edge");
    }
    match edges::fallback_successor(ctx.graph, node_id, cfg.default_label.as_deref()) {
        Some(next) => {
            ctx.note = Some("branch default".to_string());
            StepOutcome::Advance(next.to_string())
        }
        None => StepOutcome::fail(
            FailureKind::NoMatchingBranch,
            "no branch matched and no default edge exists",
            node_id,
        ),
    }
}
