//! In-memory contact store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use crate::errors::ContactStoreError;
use crate::traits::ContactStore;

/// Contacts keyed by (team, contact). Each contact is a JSON object with
/// an `id`, a `tags` array and arbitrary fields.
#[derive(Clone, Default)]
pub struct InMemoryContactStore {
    contacts: Arc<RwLock<BTreeMap<(String, String), Map<String, Value>>>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a contact. Non-object values are ignored.
    pub async fn upsert(&self, team_id: &str, contact_id: &str, fields: Value) {
        let Value::Object(mut fields) = fields else {
            return;
        };
        fields.insert("id".to_string(), json!(contact_id));
        fields.entry("tags").or_insert_with(|| json!([]));
        self.contacts
            .write()
            .await
            .insert((team_id.to_string(), contact_id.to_string()), fields);
    }

    async fn with_contact<T>(
        &self,
        team_id: &str,
        contact_id: &str,
        f: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> Result<T, ContactStoreError> {
        let mut contacts = self.contacts.write().await;
        let contact = contacts
            .get_mut(&(team_id.to_string(), contact_id.to_string()))
            .ok_or_else(|| ContactStoreError::NotFound {
                id: contact_id.to_string(),
            })?;
        Ok(f(contact))
    }
}

/// The contact's tag list; a non-array `tags` value is reset to empty.
fn tags(contact: &mut Map<String, Value>) -> Option<&mut Vec<Value>> {
    let entry = contact.entry("tags").or_insert_with(|| json!([]));
    if !entry.is_array() {
        *entry = json!([]);
    }
    entry.as_array_mut()
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn snapshot(&self, team_id: &str, contact_id: &str) -> Result<Option<Value>, ContactStoreError> {
        Ok(self
            .contacts
            .read()
            .await
            .get(&(team_id.to_string(), contact_id.to_string()))
            .map(|c| Value::Object(c.clone())))
    }

    async fn add_tag(&self, team_id: &str, contact_id: &str, tag_id: &str) -> Result<(), ContactStoreError> {
        self.with_contact(team_id, contact_id, |c| {
            if let Some(tags) = tags(c) {
                if !tags.iter().any(|t| t.as_str() == Some(tag_id)) {
                    tags.push(json!(tag_id));
                }
            }
        })
        .await
    }

    async fn remove_tag(&self, team_id: &str, contact_id: &str, tag_id: &str) -> Result<(), ContactStoreError> {
        self.with_contact(team_id, contact_id, |c| {
            if let Some(tags) = tags(c) {
                tags.retain(|t| t.as_str() != Some(tag_id));
            }
        })
        .await
    }

    async fn set_field(
        &self,
        team_id: &str,
        contact_id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), ContactStoreError> {
        self.with_contact(team_id, contact_id, |c| {
            c.insert(field.to_string(), value);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tag_and_field_writes() {
        let store = InMemoryContactStore::new();
        store.upsert("t1", "c1", json!({"name": "Ada"})).await;

        store.add_tag("t1", "c1", "vip").await.unwrap();
        store.add_tag("t1", "c1", "vip").await.unwrap();
        store.set_field("t1", "c1", "plan", json!("pro")).await.unwrap();

        let snap = store.snapshot("t1", "c1").await.unwrap().unwrap();
        assert_eq!(snap["tags"], json!(["vip"]));
        assert_eq!(snap["plan"], json!("pro"));
        assert_eq!(snap["id"], json!("c1"));

        store.remove_tag("t1", "c1", "vip").await.unwrap();
        let snap = store.snapshot("t1", "c1").await.unwrap().unwrap();
        assert_eq!(snap["tags"], json!([]));
    }

    #[tokio::test]
    async fn unknown_contact() {
        let store = InMemoryContactStore::new();
        assert!(store.snapshot("t1", "nobody").await.unwrap().is_none());
        let err = store.add_tag("t1", "nobody", "vip").await.unwrap_err();
        assert!(matches!(err, ContactStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn contacts_are_team_scoped() {
        let store = InMemoryContactStore::new();
        store.upsert("t1", "c1", json!({})).await;
        assert!(store.snapshot("t2", "c1").await.unwrap().is_none());
    }
}
