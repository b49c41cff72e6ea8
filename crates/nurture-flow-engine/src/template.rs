//! `{{ placeholder }}` rendering against an execution's variable context.
//!
//! Placeholders are dotted paths (`name`, `contact.first_name`,
//! `variables.score`, `items.0`). Unresolved placeholders render as the
//! empty string. An unclosed `{{` is left as literal text.

use serde_json::Value;
use std::collections::BTreeMap;

/// Render a template string.
pub fn render(template: &str, vars: &BTreeMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        if let Some(value) = lookup(vars, after[..close].trim()) {
            out.push_str(&stringify(value));
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Render every string leaf of a JSON value.
pub fn render_value(value: &Value, vars: &BTreeMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a dotted path against the variable context.
///
/// `variables.` is an optional prefix naming the context itself; it is
/// stripped unless a variable is literally called `variables`.
/// `contact.` resolves inside the contact snapshot.
pub fn lookup<'a>(vars: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut segments = path.split('.');
    let mut head = segments.next()?;
    if head == "variables" && !vars.contains_key("variables") {
        head = segments.next()?;
    }
    let mut current = vars.get(head)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form of a value: strings verbatim, null as empty, everything else as
/// JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(v: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn substitutes_placeholder() {
        assert_eq!(render("Hello {{name}}", &vars(json!({"name": "X"}))), "Hello X");
    }

    #[test]
    fn missing_placeholder_is_removed() {
        assert_eq!(render("{{missing}}", &BTreeMap::new()), "");
        assert_eq!(render("Hi {{ nobody }}!", &BTreeMap::new()), "Hi !");
    }

    #[test]
    fn dotted_paths_and_prefixes() {
        let v = vars(json!({
            "contact": {"first_name": "Ada", "tags": ["vip", "beta"]},
            "score": 42
        }));
        assert_eq!(render("{{contact.first_name}}", &v), "Ada");
        assert_eq!(render("{{variables.score}}", &v), "42");
        assert_eq!(render("{{contact.tags.1}}", &v), "beta");
        assert_eq!(render("{{contact.tags.9}}", &v), "");
    }

    #[test]
    fn non_string_values_stringify() {
        let v = vars(json!({"flag": true, "nothing": null, "obj": {"a": 1}}));
        assert_eq!(render("{{flag}}/{{nothing}}/{{obj}}", &v), "true//{\"a\":1}");
    }

    #[test]
    fn unclosed_braces_stay_literal() {
        let v = vars(json!({"name": "X"}));
        assert_eq!(render("{{name}} and {{oops", &v), "X and {{oops");
    }

    #[test]
    fn render_value_walks_json() {
        let v = vars(json!({"id": "c1"}));
        let body = json!({"contact": "{{id}}", "list": ["{{id}}", 3]});
        assert_eq!(render_value(&body, &v), json!({"contact": "c1", "list": ["c1", 3]}));
    }
}
