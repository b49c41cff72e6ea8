//! Trigger predicates.

use chrono::{DateTime, Utc};

use crate::types::{TriggerEvent, TriggerPayload, TriggerSpec};

/// Whether `event` satisfies the trigger predicate at `now`.
pub fn matches(spec: &TriggerSpec, event: &TriggerEvent, now: DateTime<Utc>) -> bool {
    match (spec, &event.payload) {
        (TriggerSpec::Keyword { keywords }, TriggerPayload::Message { text }) => {
            contains_keyword(text, keywords)
        }
        (TriggerSpec::TagAdded { tag_id }, TriggerPayload::TagAdded { tag_id: got })
        | (TriggerSpec::TagRemoved { tag_id }, TriggerPayload::TagRemoved { tag_id: got }) => tag_id == got,
        (TriggerSpec::FieldUpdated { field }, TriggerPayload::FieldUpdated { field: got, .. }) => {
            field.eq_ignore_ascii_case(got)
        }
        // Gate only: no keywords means the window alone never fires.
        (TriggerSpec::TimeBased(window), TriggerPayload::Message { text }) => {
            !window.keywords.is_empty() && contains_keyword(text, &window.keywords) && window.contains(now)
        }
        (TriggerSpec::Webhook { webhook_url }, TriggerPayload::Webhook { webhook_url: got, .. }) => {
            webhook_url == got
        }
        (TriggerSpec::MessageReceived, TriggerPayload::Message { .. }) => true,
        _ => false,
    }
}

/// Case-insensitive substring match against any keyword.
fn contains_keyword(text: &str, keywords: &[String]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.to_lowercase())
        .any(|k| !k.is_empty() && haystack.contains(&k))
}
