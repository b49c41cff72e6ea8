//! In-memory index of active flows by trigger type.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::matcher::matches;
use crate::types::{FlowDefinition, TriggerEvent, TriggerSpec, TriggerType};

/// One active flow's entry condition.
#[derive(Debug, Clone)]
pub struct TriggerRegistration {
    pub flow_id: String,
    pub team_id: String,
    pub trigger_type: TriggerType,
    pub trigger_config: Value,
    pub spec: TriggerSpec,
}

impl TriggerRegistration {
    pub fn new(
        flow_id: impl Into<String>,
        team_id: impl Into<String>,
        trigger_type: TriggerType,
        trigger_config: Value,
    ) -> Result<Self, Vec<String>> {
        let spec = TriggerSpec::parse(trigger_type, &trigger_config)?;
        Ok(Self {
            flow_id: flow_id.into(),
            team_id: team_id.into(),
            trigger_type,
            trigger_config,
            spec,
        })
    }

    pub fn from_definition(def: &FlowDefinition) -> Result<Self, Vec<String>> {
        let kind = def
            .trigger_kind()
            .ok_or_else(|| vec![format!("Unknown trigger type: {}", def.trigger_type)])?;
        Self::new(&def.id, &def.team_id, kind, def.trigger_config.clone())
    }
}

/// Process-wide trigger index, safe to share across tasks.
///
/// Registrations are kept in insertion order per trigger type; matching
/// walks that order and the first hit wins.
#[derive(Default)]
pub struct TriggerRegistry {
    by_type: RwLock<HashMap<TriggerType, Vec<TriggerRegistration>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration, replacing any existing one for the same flow.
    pub fn register(&self, registration: TriggerRegistration) {
        let mut map = self.by_type.write();
        for regs in map.values_mut() {
            regs.retain(|r| r.flow_id != registration.flow_id);
        }
        tracing::debug!(
            flow_id = %registration.flow_id,
            trigger_type = %registration.trigger_type,
            "trigger registered"
        );
        map.entry(registration.trigger_type)
            .or_default()
            .push(registration);
    }

    /// Remove the flow's registration under `trigger_type`. No-op if absent.
    pub fn unregister(&self, flow_id: &str, trigger_type: TriggerType) {
        if let Some(regs) = self.by_type.write().get_mut(&trigger_type) {
            regs.retain(|r| r.flow_id != flow_id);
        }
    }

    /// Remove the flow under every trigger type. No-op if absent.
    pub fn unregister_flow(&self, flow_id: &str) {
        for regs in self.by_type.write().values_mut() {
            regs.retain(|r| r.flow_id != flow_id);
        }
    }

    /// Registrations for one team and trigger type, in match order.
    pub fn candidates(&self, team_id: &str, trigger_type: TriggerType) -> Vec<TriggerRegistration> {
        self.by_type
            .read()
            .get(&trigger_type)
            .map(|regs| {
                regs.iter()
                    .filter(|r| r.team_id == team_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First flow whose predicate accepts the event.
    pub fn match_event(
        &self,
        trigger_type: TriggerType,
        event: &TriggerEvent,
        now: DateTime<Utc>,
    ) -> Option<String> {
        self.candidates(&event.team_id, trigger_type)
            .into_iter()
            .find(|r| matches(&r.spec, event, now))
            .map(|r| r.flow_id)
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.by_type
            .read()
            .values()
            .any(|regs| regs.iter().any(|r| r.flow_id == flow_id))
    }

    pub fn len(&self) -> usize {
        self.by_type.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything and rebuild from the given definitions. Inactive
    /// definitions are skipped; definitions whose trigger no longer parses
    /// are skipped with a warning. Returns the number registered.
    pub fn reload<'a>(&self, definitions: impl IntoIterator<Item = &'a FlowDefinition>) -> usize {
        let mut fresh: HashMap<TriggerType, Vec<TriggerRegistration>> = HashMap::new();
        let mut count = 0;
        for def in definitions.into_iter().filter(|d| d.is_active) {
            match TriggerRegistration::from_definition(def) {
                Ok(reg) => {
                    fresh.entry(reg.trigger_type).or_default().push(reg);
                    count += 1;
                }
                Err(errors) => {
                    tracing::warn!(
                        flow_id = %def.id,
                        errors = ?errors,
                        "skipping flow with invalid trigger during reload"
                    );
                }
            }
        }
        *self.by_type.write() = fresh;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriggerPayload;
    use serde_json::json;

    fn keyword(flow: &str, team: &str, words: &[&str]) -> TriggerRegistration {
        TriggerRegistration::new(flow, team, TriggerType::Keyword, json!({"keywords": words})).unwrap()
    }

    fn message(team: &str, text: &str) -> TriggerEvent {
        TriggerEvent::new(team, "c1", TriggerPayload::Message { text: text.into() })
    }

    #[test]
    fn register_and_match() {
        let reg = TriggerRegistry::new();
        reg.register(keyword("f1", "t1", &["hello"]));
        assert_eq!(
            reg.match_event(TriggerType::Keyword, &message("t1", "Hello there"), Utc::now()),
            Some("f1".to_string())
        );
    }

    #[test]
    fn candidates_are_team_scoped() {
        let reg = TriggerRegistry::new();
        reg.register(keyword("f1", "t1", &["hello"]));
        assert!(reg
            .match_event(TriggerType::Keyword, &message("t2", "hello"), Utc::now())
            .is_none());
        assert!(reg.candidates("t2", TriggerType::Keyword).is_empty());
    }

    #[test]
    fn first_registration_wins() {
        let reg = TriggerRegistry::new();
        reg.register(keyword("f1", "t1", &["hi"]));
        reg.register(keyword("f2", "t1", &["hi"]));
        assert_eq!(
            reg.match_event(TriggerType::Keyword, &message("t1", "hi"), Utc::now()),
            Some("f1".to_string())
        );
    }

    #[test]
    fn register_replaces_existing_entry() {
        let reg = TriggerRegistry::new();
        reg.register(keyword("f1", "t1", &["old"]));
        reg.register(keyword("f1", "t1", &["new"]));
        assert_eq!(reg.len(), 1);
        assert!(reg
            .match_event(TriggerType::Keyword, &message("t1", "old"), Utc::now())
            .is_none());
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = TriggerRegistry::new();
        reg.register(keyword("f1", "t1", &["hi"]));
        reg.unregister("f1", TriggerType::Keyword);
        reg.unregister("f1", TriggerType::Keyword);
        reg.unregister("missing", TriggerType::TagAdded);
        assert!(reg.is_empty());
    }

    #[test]
    fn reload_rebuilds_from_active_definitions() {
        use crate::test_support::FlowBuilder;

        let reg = TriggerRegistry::new();
        reg.register(keyword("stale", "t1", &["x"]));

        let active = FlowBuilder::new("a").team("t1").build();
        let inactive = FlowBuilder::new("b").team("t1").inactive().build();
        let broken = FlowBuilder::new("c").team("t1").trigger("keyword", json!({})).build();

        assert_eq!(reg.reload([&active, &inactive, &broken]), 1);
        assert!(reg.contains("a"));
        assert!(!reg.contains("stale"));
        assert!(!reg.contains("b"));
    }
}
