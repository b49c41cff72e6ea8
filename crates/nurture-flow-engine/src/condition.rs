//! Rule evaluation for Condition and Branch nodes.
//!
//! - Field access: dotted paths resolved by [`template::lookup`]
//! - Numeric comparison uses f64 coercion; numeric strings count as numbers
//! - String comparison is case-sensitive
//! - A missing field makes its rule false for every operator, never an error

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::template::{lookup, stringify};
use crate::types::{ConditionOperator, ConditionRule, LogicalOperator};

/// Combine a rule list with the configured boolean operator.
pub fn evaluate_rules(
    rules: &[ConditionRule],
    logical: LogicalOperator,
    vars: &BTreeMap<String, Value>,
) -> bool {
    match logical {
        LogicalOperator::And => rules.iter().all(|r| evaluate_rule(r, vars)),
        LogicalOperator::Or => rules.iter().any(|r| evaluate_rule(r, vars)),
    }
}

pub fn evaluate_rule(rule: &ConditionRule, vars: &BTreeMap<String, Value>) -> bool {
    let Some(actual) = lookup(vars, &rule.field) else {
        return false;
    };
    let expected = &rule.value;
    match rule.operator {
        ConditionOperator::Equals => equals(actual, expected),
        ConditionOperator::NotEquals => !equals(actual, expected),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::StartsWith => text(actual).starts_with(&text(expected)),
        ConditionOperator::EndsWith => text(actual).ends_with(&text(expected)),
        ConditionOperator::GreaterThan => order(actual, expected) == Some(Ordering::Greater),
        ConditionOperator::LessThan => order(actual, expected) == Some(Ordering::Less),
        ConditionOperator::GreaterThanOrEqual => {
            matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        ConditionOperator::LessThanOrEqual => {
            matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
        ConditionOperator::IsEmpty => is_empty(actual),
        ConditionOperator::IsNotEmpty => !is_empty(actual),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    stringify(value)
}

fn equals(actual: &Value, expected: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_f64(actual), as_f64(expected)) {
        return (l - r).abs() < f64::EPSILON;
    }
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_) | Value::Number(_) | Value::Bool(_), _) => text(actual) == text(expected),
        _ => actual == expected,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| equals(item, expected)),
        Value::Object(map) => map.contains_key(&text(expected)),
        Value::Null => false,
        other => text(other).contains(&text(expected)),
    }
}

fn order(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (as_f64(actual), as_f64(expected)) {
        if (l - r).abs() < f64::EPSILON {
            return Some(Ordering::Equal);
        }
        return l.partial_cmp(&r);
    }
    match (actual, expected) {
        (Value::String(l), Value::String(r)) => Some(l.as_str().cmp(r.as_str())),
        // Type mismatch → no ordering
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
