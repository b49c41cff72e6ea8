//! Trigger types: how flow executions are initiated.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Timelike, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::normalize_kind;

/// Entry condition class of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TriggerType {
    Keyword,
    TagAdded,
    TagRemoved,
    FieldUpdated,
    TimeBased,
    Webhook,
    MessageReceived,
}

impl TriggerType {
    pub const ALL: [TriggerType; 7] = [
        TriggerType::Keyword,
        TriggerType::TagAdded,
        TriggerType::TagRemoved,
        TriggerType::FieldUpdated,
        TriggerType::TimeBased,
        TriggerType::Webhook,
        TriggerType::MessageReceived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::TagAdded => "tag_added",
            Self::TagRemoved => "tag_removed",
            Self::FieldUpdated => "field_updated",
            Self::TimeBased => "time_based",
            Self::Webhook => "webhook",
            Self::MessageReceived => "message_received",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_kind(s);
        Self::ALL
            .into_iter()
            .find(|t| normalize_kind(t.as_str()) == wanted)
            .ok_or_else(|| format!("unknown trigger type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Trigger configuration
// ---------------------------------------------------------------------------

/// Parsed trigger configuration, keyed by trigger type.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TriggerSpec {
    Keyword { keywords: Vec<String> },
    TagAdded { tag_id: String },
    TagRemoved { tag_id: String },
    FieldUpdated { field: String },
    TimeBased(TimeWindow),
    Webhook { webhook_url: String },
    MessageReceived,
}

impl TriggerSpec {
    pub fn parse(kind: TriggerType, config: &Value) -> Result<TriggerSpec, Vec<String>> {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| config.get(*k))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match kind {
            TriggerType::Keyword => {
                let keywords = keyword_list(config);
                if keywords.is_empty() {
                    Err(vec!["Keyword trigger requires at least one keyword".to_string()])
                } else {
                    Ok(TriggerSpec::Keyword { keywords })
                }
            }
            TriggerType::TagAdded | TriggerType::TagRemoved => {
                let tag_id = text(&["tag_id", "tagId"])
                    .ok_or_else(|| vec![format!("{kind} trigger requires a tagId")])?;
                Ok(if kind == TriggerType::TagAdded {
                    TriggerSpec::TagAdded { tag_id }
                } else {
                    TriggerSpec::TagRemoved { tag_id }
                })
            }
            TriggerType::FieldUpdated => text(&["field", "field_name", "fieldName"])
                .map(|field| TriggerSpec::FieldUpdated { field })
                .ok_or_else(|| vec!["FieldUpdated trigger requires a field name".to_string()]),
            TriggerType::TimeBased => {
                let schedule = text(&["schedule"])
                    .ok_or_else(|| vec!["TimeBased trigger requires a schedule".to_string()])?;
                TimeWindow::new(
                    &schedule,
                    config
                        .get("utc_offset_minutes")
                        .or_else(|| config.get("utcOffsetMinutes"))
                        .and_then(Value::as_i64)
                        .unwrap_or(0) as i32,
                    keyword_list(config),
                )
                .map(TriggerSpec::TimeBased)
                .map_err(|e| vec![e])
            }
            TriggerType::Webhook => text(&["webhook_url", "webhookUrl"])
                .map(|webhook_url| TriggerSpec::Webhook { webhook_url })
                .ok_or_else(|| vec!["Webhook trigger requires a webhookUrl".to_string()]),
            TriggerType::MessageReceived => Ok(TriggerSpec::MessageReceived),
        }
    }
}

fn keyword_list(config: &Value) -> Vec<String> {
    config
        .get("keywords")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a 5- or 6-field cron expression to the 7-field format the `cron`
/// crate expects (`sec min hour day month weekday year`).
pub(crate) fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => format!("0 {expr} *"),
        6 => format!("0 {expr}"),
        _ => expr.to_string(),
    }
}

/// A recurring local-time window described by a cron schedule.
///
/// The window is open during every minute the schedule selects, evaluated in
/// the configured fixed UTC offset. It only gates keyword matches; it never
/// fires a flow on its own.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub schedule: String,
    pub utc_offset_minutes: i32,
    pub keywords: Vec<String>,
    parsed: Schedule,
    offset: FixedOffset,
}

impl TimeWindow {
    pub fn new(schedule: &str, utc_offset_minutes: i32, keywords: Vec<String>) -> Result<Self, String> {
        let parsed: Schedule = normalize_cron_expression(schedule)
            .parse()
            .map_err(|e| format!("invalid cron expression '{schedule}': {e}"))?;
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .ok_or_else(|| format!("utc_offset_minutes out of range: {utc_offset_minutes}"))?;
        Ok(Self {
            schedule: schedule.to_string(),
            utc_offset_minutes,
            keywords,
            parsed,
            offset,
        })
    }

    /// Whether `now` falls inside a minute selected by the schedule.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        let Some(minute) = local.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return false;
        };
        let just_before = minute - ChronoDuration::seconds(1);
        self.parsed
            .after(&just_before)
            .next()
            .is_some_and(|next| next == minute)
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

/// An inbound event from the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerEvent {
    pub team_id: String,
    pub contact_id: String,
    pub payload: TriggerPayload,
    /// Extra caller data merged into the execution variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
#[non_exhaustive]
pub enum TriggerPayload {
    Message { text: String },
    TagAdded { tag_id: String },
    TagRemoved { tag_id: String },
    FieldUpdated { field: String, value: Value },
    Webhook { webhook_url: String, body: Value },
    /// Scheduled tick with no message attached.
    Tick,
}

impl TriggerEvent {
    pub fn new(team_id: impl Into<String>, contact_id: impl Into<String>, payload: TriggerPayload) -> Self {
        Self {
            team_id: team_id.into(),
            contact_id: contact_id.into(),
            payload,
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Message text, when the event carries one.
    pub fn message_text(&self) -> Option<&str> {
        match &self.payload {
            TriggerPayload::Message { text } => Some(text),
            _ => None,
        }
    }

    /// Variables contributed by this event: payload-derived keys first, then
    /// caller data (which wins on collision).
    pub fn initial_data(&self) -> BTreeMap<String, Value> {
        let mut vars = BTreeMap::new();
        match &self.payload {
            TriggerPayload::Message { text } => {
                vars.insert("last_message".to_string(), json!(text));
            }
            TriggerPayload::TagAdded { tag_id } | TriggerPayload::TagRemoved { tag_id } => {
                vars.insert("tag_id".to_string(), json!(tag_id));
            }
            TriggerPayload::FieldUpdated { field, value } => {
                vars.insert("field".to_string(), json!(field));
                vars.insert("field_value".to_string(), value.clone());
            }
            TriggerPayload::Webhook { body, .. } => {
                vars.insert("webhook_body".to_string(), body.clone());
            }
            TriggerPayload::Tick => {}
        }
        if let Ok(event) = serde_json::to_value(&self.payload) {
            vars.insert("last_event".to_string(), event);
        }
        vars.extend(self.data.clone());
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trigger_type_parses_any_casing() {
        assert_eq!("TagAdded".parse::<TriggerType>(), Ok(TriggerType::TagAdded));
        assert_eq!("time_based".parse::<TriggerType>(), Ok(TriggerType::TimeBased));
        assert!("sms".parse::<TriggerType>().is_err());
    }

    #[test]
    fn keyword_requires_list() {
        assert!(TriggerSpec::parse(TriggerType::Keyword, &json!({"keywords": []})).is_err());
        assert!(TriggerSpec::parse(TriggerType::Keyword, &json!({"keywords": [" "]})).is_err());
        assert!(TriggerSpec::parse(TriggerType::Keyword, &json!({"keywords": ["hi"]})).is_ok());
    }

    #[test]
    fn tag_webhook_and_field_configs() {
        assert!(TriggerSpec::parse(TriggerType::TagAdded, &json!({"tagId": "vip"})).is_ok());
        assert!(TriggerSpec::parse(TriggerType::TagRemoved, &json!({})).is_err());
        assert!(TriggerSpec::parse(TriggerType::FieldUpdated, &json!({"field": "plan"})).is_ok());
        assert!(TriggerSpec::parse(TriggerType::Webhook, &json!({})).is_err());
        assert!(TriggerSpec::parse(TriggerType::MessageReceived, &Value::Null).is_ok());
    }

    #[test]
    fn time_based_rejects_bad_cron() {
        let errs = TriggerSpec::parse(TriggerType::TimeBased, &json!({"schedule": "not a cron"})).unwrap_err();
        assert!(errs[0].contains("invalid cron expression"));
        assert!(TriggerSpec::parse(TriggerType::TimeBased, &json!({})).is_err());
    }

    #[test]
    fn normalize_cron_fields() {
        assert_eq!(normalize_cron_expression("* 9-17 * * *"), "0 * 9-17 * * * *");
        assert_eq!(normalize_cron_expression("* 9-17 * * * *"), "0 * 9-17 * * * *");
        assert_eq!(normalize_cron_expression("0 * 9 * * * *"), "0 * 9 * * * *");
    }

    #[test]
    fn time_window_respects_offset() {
        // Every minute from 09:00 to 17:59 local time.
        let window = TimeWindow::new("* 9-17 * * *", 120, vec![]).unwrap();
        // 08:30 UTC is 10:30 at UTC+2.
        let inside = Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 15).unwrap();
        assert!(window.contains(inside));
        // 16:30 UTC is 18:30 at UTC+2.
        let outside = Utc.with_ymd_and_hms(2024, 3, 4, 16, 30, 0).unwrap();
        assert!(!window.contains(outside));
    }

    #[test]
    fn initial_data_from_message() {
        let event = TriggerEvent::new("t1", "c1", TriggerPayload::Message { text: "hello".into() })
            .with_data("source", json!("sms"));
        let vars = event.initial_data();
        assert_eq!(vars["last_message"], json!("hello"));
        assert_eq!(vars["source"], json!("sms"));
        assert_eq!(vars["last_event"]["kind"], json!("message"));
    }
}
