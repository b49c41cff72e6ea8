//! In-memory flow store for tests and single-process hosts.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::FlowStoreError;
use crate::traits::FlowStore;
use crate::types::FlowDefinition;

#[derive(Clone, Default)]
pub struct InMemoryFlowStore {
    flows: Arc<RwLock<BTreeMap<String, FlowDefinition>>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn put(&self, flow: &FlowDefinition) -> Result<(), FlowStoreError> {
        self.flows.write().await.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowDefinition>, FlowStoreError> {
        Ok(self.flows.read().await.get(flow_id).cloned())
    }

    async fn delete(&self, flow_id: &str) -> Result<bool, FlowStoreError> {
        Ok(self.flows.write().await.remove(flow_id).is_some())
    }

    async fn list(&self, team_id: Option<&str>) -> Result<Vec<FlowDefinition>, FlowStoreError> {
        Ok(self
            .flows
            .read()
            .await
            .values()
            .filter(|f| team_id.is_none_or(|t| f.team_id == t))
            .cloned()
            .collect())
    }
}
