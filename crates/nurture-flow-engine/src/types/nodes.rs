//! Typed node configurations.
//!
//! [`NodeSpec`] is the closed sum type over the twelve node kinds. It is
//! produced from a raw [`NodeInstance`](super::NodeInstance) config by
//! [`NodeSpec::parse`], which collects every missing or malformed field
//! instead of stopping at the first one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::graph::NodeType;
use super::{normalize_kind, RetryPolicy};

/// Parsed, typed view of a node's config.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum NodeSpec {
    Trigger,
    Wait(WaitConfig),
    SendMessage(SendMessageConfig),
    Condition(ConditionConfig),
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    UpdateField(UpdateFieldConfig),
    HttpRequest(HttpRequestConfig),
    AiChatbot(AiChatbotConfig),
    Branch(BranchConfig),
    Join,
    End,
}

impl NodeSpec {
    /// Parse a raw config for the given kind.
    pub fn parse(kind: NodeType, config: &Value) -> Result<NodeSpec, Vec<String>> {
        match kind {
            NodeType::Trigger => Ok(NodeSpec::Trigger),
            NodeType::Join => Ok(NodeSpec::Join),
            NodeType::End => Ok(NodeSpec::End),
            NodeType::Wait => WaitConfig::parse(config).map(NodeSpec::Wait),
            NodeType::SendMessage => SendMessageConfig::parse(config).map(NodeSpec::SendMessage),
            NodeType::Condition => ConditionConfig::parse(config).map(NodeSpec::Condition),
            NodeType::AddTag => TagConfig::parse(config).map(NodeSpec::AddTag),
            NodeType::RemoveTag => TagConfig::parse(config).map(NodeSpec::RemoveTag),
            NodeType::UpdateField => UpdateFieldConfig::parse(config).map(NodeSpec::UpdateField),
            NodeType::HttpRequest => HttpRequestConfig::parse(config).map(NodeSpec::HttpRequest),
            NodeType::AiChatbot => AiChatbotConfig::parse(config).map(NodeSpec::AiChatbot),
            NodeType::Branch => BranchConfig::parse(config).map(NodeSpec::Branch),
        }
    }

    pub fn kind(&self) -> NodeType {
        match self {
            NodeSpec::Trigger => NodeType::Trigger,
            NodeSpec::Wait(_) => NodeType::Wait,
            NodeSpec::SendMessage(_) => NodeType::SendMessage,
            NodeSpec::Condition(_) => NodeType::Condition,
            NodeSpec::AddTag(_) => NodeType::AddTag,
            NodeSpec::RemoveTag(_) => NodeType::RemoveTag,
            NodeSpec::UpdateField(_) => NodeType::UpdateField,
            NodeSpec::HttpRequest(_) => NodeType::HttpRequest,
            NodeSpec::AiChatbot(_) => NodeType::AiChatbot,
            NodeSpec::Branch(_) => NodeType::Branch,
            NodeSpec::Join => NodeType::Join,
            NodeSpec::End => NodeType::End,
        }
    }
}

// ---------------------------------------------------------------------------
// Config field helpers
// ---------------------------------------------------------------------------

/// First present key among `keys` (snake_case first, camelCase alias after).
fn field<'a>(config: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| config.get(*k))
        .filter(|v| !v.is_null())
}

fn non_empty_str<'a>(config: &'a Value, keys: &[&str]) -> Option<&'a str> {
    field(config, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn number(config: &Value, keys: &[&str]) -> Option<f64> {
    field(config, keys).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn optional_u64(config: &Value, keys: &[&str], errors: &mut Vec<String>) -> Option<u64> {
    let raw = field(config, keys)?;
    match raw.as_u64() {
        Some(n) => Some(n),
        None => {
            errors.push(format!("{} must be a non-negative integer", keys[0]));
            None
        }
    }
}

fn retry_policy(config: &Value, errors: &mut Vec<String>) -> RetryPolicy {
    match field(config, &["retry"]) {
        None => RetryPolicy::default(),
        Some(raw) => match serde_json::from_value::<RetryPolicy>(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                errors.push(format!("retry policy is malformed: {e}"));
                RetryPolicy::default()
            }
        },
    }
}

fn finish<T>(value: T, errors: Vec<String>) -> Result<T, Vec<String>> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Wait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl WaitUnit {
    fn seconds(self) -> u64 {
        match self {
            WaitUnit::Seconds => 1,
            WaitUnit::Minutes => 60,
            WaitUnit::Hours => 3_600,
            WaitUnit::Days => 86_400,
        }
    }
}

impl FromStr for WaitUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(WaitUnit::Seconds),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(WaitUnit::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(WaitUnit::Hours),
            "d" | "day" | "days" => Ok(WaitUnit::Days),
            other => Err(format!("unknown wait unit: {other}")),
        }
    }
}

/// Wait node: suspend for a fixed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    pub amount: u64,
    pub unit: WaitUnit,
}

impl WaitConfig {
    /// Accepts `{duration, unit}` or `{duration_seconds}`.
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let (amount, unit) = if let Some(secs) = number(config, &["duration_seconds", "durationSeconds"]) {
            (secs, WaitUnit::Seconds)
        } else {
            let unit = match non_empty_str(config, &["unit"]) {
                None => WaitUnit::Seconds,
                Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                    errors.push(e);
                    WaitUnit::Seconds
                }),
            };
            match number(config, &["duration"]) {
                Some(d) => (d, unit),
                None => {
                    errors.push("Wait node requires a duration".to_string());
                    (0.0, unit)
                }
            }
        };
        if errors.is_empty() && !(amount >= 1.0 && amount.fract() == 0.0) {
            errors.push("Wait duration must be a positive whole number".to_string());
        }
        finish(
            WaitConfig {
                amount: amount as u64,
                unit,
            },
            errors,
        )
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.amount.saturating_mul(self.unit.seconds()))
    }
}

// ---------------------------------------------------------------------------
// SendMessage / tags / fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SendMessageConfig {
    /// Template rendered against the execution variables.
    pub message: String,
}

impl SendMessageConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        match non_empty_str(config, &["message"]) {
            Some(m) => Ok(SendMessageConfig {
                message: m.to_string(),
            }),
            None => Err(vec!["SendMessage node requires a non-empty message".to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagConfig {
    pub tag_id: String,
}

impl TagConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        match non_empty_str(config, &["tag_id", "tagId"]) {
            Some(t) => Ok(TagConfig {
                tag_id: t.to_string(),
            }),
            None => Err(vec!["Tag node requires a tag_id".to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFieldConfig {
    pub field: String,
    /// Literal value; string values are rendered as templates.
    pub value: Value,
}

impl UpdateFieldConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let field_name = non_empty_str(config, &["field", "field_name", "fieldName"]);
        if field_name.is_none() {
            errors.push("UpdateField node requires a field".to_string());
        }
        let value = config.get("value").cloned();
        if value.is_none() {
            errors.push("UpdateField node requires a value".to_string());
        }
        finish(
            UpdateFieldConfig {
                field: field_name.unwrap_or_default().to_string(),
                value: value.unwrap_or(Value::Null),
            },
            errors,
        )
    }
}

// ---------------------------------------------------------------------------
// Condition / Branch
// ---------------------------------------------------------------------------

/// Comparison operators available to Condition and Branch rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    IsEmpty,
    IsNotEmpty,
}

impl ConditionOperator {
    const ALL: [ConditionOperator; 12] = [
        ConditionOperator::Equals,
        ConditionOperator::NotEquals,
        ConditionOperator::Contains,
        ConditionOperator::NotContains,
        ConditionOperator::StartsWith,
        ConditionOperator::EndsWith,
        ConditionOperator::GreaterThan,
        ConditionOperator::LessThan,
        ConditionOperator::GreaterThanOrEqual,
        ConditionOperator::LessThanOrEqual,
        ConditionOperator::IsEmpty,
        ConditionOperator::IsNotEmpty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterThanOrEqual => "greater_than_or_equal",
            Self::LessThanOrEqual => "less_than_or_equal",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// Whether the operator compares against a configured value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_kind(s);
        Self::ALL
            .into_iter()
            .find(|op| normalize_kind(op.as_str()) == wanted)
            .ok_or_else(|| format!("unknown operator: {s}"))
    }
}

/// How a rule list combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl FromStr for LogicalOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "ALL" => Ok(LogicalOperator::And),
            "OR" | "ANY" => Ok(LogicalOperator::Or),
            other => Err(format!("unknown logical operator: {other}")),
        }
    }
}

/// One `{field, operator, value}` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRule {
    /// Dotted path, e.g. `contact.first_name` or `variables.score`.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

fn parse_rules(raw: Option<&Value>, owner: &str, errors: &mut Vec<String>) -> Vec<ConditionRule> {
    let Some(list) = raw.and_then(Value::as_array).filter(|l| !l.is_empty()) else {
        errors.push(format!("{owner} requires at least one rule"));
        return Vec::new();
    };
    let mut rules = Vec::with_capacity(list.len());
    for (i, rule) in list.iter().enumerate() {
        let field_name = non_empty_str(rule, &["field"]);
        let operator = non_empty_str(rule, &["operator"]);
        match (field_name, operator) {
            (None, _) => errors.push(format!("{owner} rule {i} is missing a field")),
            (_, None) => errors.push(format!("{owner} rule {i} is missing an operator")),
            (Some(f), Some(op)) => match op.parse::<ConditionOperator>() {
                Ok(operator) => rules.push(ConditionRule {
                    field: f.to_string(),
                    operator,
                    value: rule.get("value").cloned().unwrap_or(Value::Null),
                }),
                Err(e) => errors.push(format!("{owner} rule {i}: {e}")),
            },
        }
    }
    rules
}

fn parse_logical(config: &Value, errors: &mut Vec<String>) -> LogicalOperator {
    match non_empty_str(config, &["logical_operator", "logicalOperator", "logic"]) {
        None => LogicalOperator::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e: String| {
            errors.push(e);
            LogicalOperator::default()
        }),
    }
}

/// Condition node: a rule list routed on `true` / `false` edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionConfig {
    pub rules: Vec<ConditionRule>,
    pub logical_operator: LogicalOperator,
}

impl ConditionConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let rules = parse_rules(field(config, &["rules", "conditions"]), "Condition node", &mut errors);
        let logical_operator = parse_logical(config, &mut errors);
        finish(
            ConditionConfig {
                rules,
                logical_operator,
            },
            errors,
        )
    }
}

/// One named arm of a Branch node.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchArm {
    /// Label of the outgoing edge followed when this arm matches.
    pub label: String,
    pub rules: Vec<ConditionRule>,
    pub logical_operator: LogicalOperator,
}

/// Branch node: first matching arm wins, else the default edge.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchConfig {
    pub branches: Vec<BranchArm>,
    /// Explicit fallback label; `default` and `else` edges are also accepted.
    pub default_label: Option<String>,
}

impl BranchConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let mut branches = Vec::new();
        match field(config, &["branches"]).and_then(Value::as_array) {
            Some(list) if !list.is_empty() => {
                for (i, arm) in list.iter().enumerate() {
                    let label = non_empty_str(arm, &["label", "name"]);
                    if label.is_none() {
                        errors.push(format!("Branch node arm {i} requires a label"));
                    }
                    let owner = format!("Branch arm '{}'", label.unwrap_or("?"));
                    let rules = parse_rules(field(arm, &["rules", "conditions"]), &owner, &mut errors);
                    let logical_operator = parse_logical(arm, &mut errors);
                    branches.push(BranchArm {
                        label: label.unwrap_or_default().to_string(),
                        rules,
                        logical_operator,
                    });
                }
            }
            _ => errors.push("Branch node requires at least one branch".to_string()),
        }
        let default_label =
            non_empty_str(config, &["default_label", "defaultLabel"]).map(str::to_string);
        finish(
            BranchConfig {
                branches,
                default_label,
            },
            errors,
        )
    }
}

// ---------------------------------------------------------------------------
// HttpRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!(
                "HttpRequest method must be one of GET, POST, PUT, PATCH, DELETE (got {other})"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestConfig {
    /// URL template.
    pub url: String,
    pub method: HttpMethod,
    /// Header value templates.
    pub headers: BTreeMap<String, String>,
    /// Body; string leaves are rendered as templates.
    pub body: Option<Value>,
    /// Per-attempt timeout; falls back to the engine default.
    pub timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
    /// Variable receiving `{status, body}` on success.
    pub save_response_to: Option<String>,
}

impl HttpRequestConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let url = non_empty_str(config, &["url"]);
        if url.is_none() {
            errors.push("HttpRequest node requires a url".to_string());
        }
        let method = match non_empty_str(config, &["method"]) {
            None => {
                errors.push("HttpRequest node requires a method".to_string());
                HttpMethod::Get
            }
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                errors.push(e);
                HttpMethod::Get
            }),
        };
        let mut headers = BTreeMap::new();
        match field(config, &["headers"]) {
            None => {}
            Some(Value::Object(map)) => {
                for (k, v) in map {
                    match v {
                        Value::String(s) => {
                            headers.insert(k.clone(), s.clone());
                        }
                        other => {
                            headers.insert(k.clone(), other.to_string());
                        }
                    }
                }
            }
            Some(_) => errors.push("HttpRequest headers must be an object".to_string()),
        }
        let timeout_ms = optional_u64(config, &["timeout_ms", "timeoutMs"], &mut errors);
        let retry = retry_policy(config, &mut errors);
        finish(
            HttpRequestConfig {
                url: url.unwrap_or_default().to_string(),
                method,
                headers,
                body: field(config, &["body"]).cloned(),
                timeout_ms,
                retry,
                save_response_to: non_empty_str(config, &["save_response_to", "saveResponseTo"])
                    .map(str::to_string),
            },
            errors,
        )
    }
}

// ---------------------------------------------------------------------------
// AiChatbot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AiChatbotConfig {
    pub system_prompt: String,
    /// Template for the user turn.
    pub input: String,
    pub output_variable: String,
    /// Turns of history sent to the provider; falls back to the engine default.
    pub context_window: Option<usize>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl AiChatbotConfig {
    fn parse(config: &Value) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();
        let system_prompt = non_empty_str(config, &["system_prompt", "systemPrompt", "prompt"]);
        if system_prompt.is_none() {
            errors.push("AiChatbot node requires a system_prompt".to_string());
        }
        let context_window =
            optional_u64(config, &["context_window", "contextWindow"], &mut errors).map(|n| n as usize);
        let timeout_ms = optional_u64(config, &["timeout_ms", "timeoutMs"], &mut errors);
        let retry = retry_policy(config, &mut errors);
        finish(
            AiChatbotConfig {
                system_prompt: system_prompt.unwrap_or_default().to_string(),
                input: non_empty_str(config, &["input"])
                    .unwrap_or("{{last_message}}")
                    .to_string(),
                output_variable: non_empty_str(config, &["output_variable", "outputVariable"])
                    .unwrap_or("ai_response")
                    .to_string(),
                context_window,
                model: non_empty_str(config, &["model"]).map(str::to_string),
                timeout_ms,
                retry,
            },
            errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wait_accepts_unit_and_seconds_forms() {
        let spec = NodeSpec::parse(NodeType::Wait, &json!({"duration": 2, "unit": "hours"})).unwrap();
        let NodeSpec::Wait(w) = spec else {
            panic!("expected wait")
        };
        assert_eq!(w.duration(), Duration::from_secs(7_200));

        let spec = NodeSpec::parse(NodeType::Wait, &json!({"durationSeconds": 5})).unwrap();
        let NodeSpec::Wait(w) = spec else {
            panic!("expected wait")
        };
        assert_eq!(w.duration(), Duration::from_secs(5));
    }

    #[test]
    fn wait_rejects_zero_and_missing() {
        assert!(NodeSpec::parse(NodeType::Wait, &json!({"duration": 0})).is_err());
        assert!(NodeSpec::parse(NodeType::Wait, &json!({})).is_err());
        assert!(NodeSpec::parse(NodeType::Wait, &json!({"duration": 3, "unit": "fortnights"})).is_err());
    }

    #[test]
    fn send_message_requires_text() {
        assert!(NodeSpec::parse(NodeType::SendMessage, &json!({"message": "  "})).is_err());
        assert!(NodeSpec::parse(NodeType::SendMessage, &json!({"message": "Hi"})).is_ok());
    }

    #[test]
    fn condition_collects_every_rule_error() {
        let errs = NodeSpec::parse(
            NodeType::Condition,
            &json!({"rules": [
                {"operator": "equals", "value": 1},
                {"field": "x", "operator": "resembles"}
            ]}),
        )
        .unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs[0].contains("missing a field"));
        assert!(errs[1].contains("unknown operator"));
    }

    #[test]
    fn condition_defaults_to_and() {
        let spec = NodeSpec::parse(
            NodeType::Condition,
            &json!({"rules": [{"field": "contact.first_name", "operator": "equals", "value": "Node"}]}),
        )
        .unwrap();
        let NodeSpec::Condition(c) = spec else {
            panic!("expected condition")
        };
        assert_eq!(c.logical_operator, LogicalOperator::And);
        assert_eq!(c.rules[0].operator, ConditionOperator::Equals);
    }

    #[test]
    fn operators_parse_in_any_casing() {
        assert_eq!(
            "greaterThanOrEqual".parse::<ConditionOperator>(),
            Ok(ConditionOperator::GreaterThanOrEqual)
        );
        assert_eq!("is_not_empty".parse::<ConditionOperator>(), Ok(ConditionOperator::IsNotEmpty));
    }

    #[test]
    fn http_method_is_restricted() {
        let errs = NodeSpec::parse(
            NodeType::HttpRequest,
            &json!({"url": "https://example.test", "method": "TRACE"}),
        )
        .unwrap_err();
        assert!(errs[0].contains("GET, POST, PUT, PATCH, DELETE"));

        let spec = NodeSpec::parse(
            NodeType::HttpRequest,
            &json!({"url": "https://example.test", "method": "post", "retry": {"max_attempts": 2}}),
        )
        .unwrap();
        let NodeSpec::HttpRequest(h) = spec else {
            panic!("expected http")
        };
        assert_eq!(h.method, HttpMethod::Post);
        assert_eq!(h.retry.max_attempts, 2);
        assert_eq!(h.retry.backoff_ms, 1_000);
    }

    #[test]
    fn http_requires_url_and_method() {
        let errs = NodeSpec::parse(NodeType::HttpRequest, &json!({})).unwrap_err();
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn ai_chatbot_defaults() {
        let spec = NodeSpec::parse(NodeType::AiChatbot, &json!({"system_prompt": "Be brief."})).unwrap();
        let NodeSpec::AiChatbot(a) = spec else {
            panic!("expected ai")
        };
        assert_eq!(a.input, "{{last_message}}");
        assert_eq!(a.output_variable, "ai_response");
        assert!(a.context_window.is_none());
    }

    #[test]
    fn branch_requires_labeled_arms() {
        let errs = NodeSpec::parse(
            NodeType::Branch,
            &json!({"branches": [{"rules": [{"field": "a", "operator": "is_empty"}]}]}),
        )
        .unwrap_err();
        assert!(errs[0].contains("requires a label"));
        assert!(NodeSpec::parse(NodeType::Branch, &json!({"branches": []})).is_err());
    }

    #[test]
    fn tag_accepts_camel_case_alias() {
        let spec = NodeSpec::parse(NodeType::AddTag, &json!({"tagId": "vip"})).unwrap();
        assert_eq!(
            spec,
            NodeSpec::AddTag(TagConfig {
                tag_id: "vip".into()
            })
        );
    }
}
