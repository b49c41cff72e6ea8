//! File-system backed flow store.
//!
//! Layout:
//! ```text
//! {base_dir}/flows/{flow_id}.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::FlowStoreError;
use crate::traits::FlowStore;
use crate::types::FlowDefinition;

/// One JSON document per flow definition.
///
/// Writes go to a temp file which is then renamed over the target, so a
/// crash mid-write never leaves a truncated definition behind.
pub struct FileFlowStore {
    flows_dir: PathBuf,
}

impl FileFlowStore {
    /// Create a store rooted at `base_dir`, creating `{base_dir}/flows/`
    /// if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, FlowStoreError> {
        let flows_dir = base_dir.into().join("flows");
        std::fs::create_dir_all(&flows_dir).map_err(|e| FlowStoreError::Store {
            message: format!("failed to create flows directory: {e}"),
        })?;
        Ok(Self { flows_dir })
    }

    fn path_for(&self, flow_id: &str) -> Result<PathBuf, FlowStoreError> {
        if flow_id.is_empty() || flow_id.contains(['/', '\\']) || flow_id.starts_with('.') {
            return Err(FlowStoreError::Store {
                message: format!("flow id '{flow_id}' is not usable as a file name"),
            });
        }
        Ok(self.flows_dir.join(format!("{flow_id}.json")))
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), FlowStoreError> {
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, data).map_err(|e| FlowStoreError::Store {
        message: format!("failed to write temp file: {e}"),
    })?;
    std::fs::rename(&temp_path, path).map_err(|e| FlowStoreError::Store {
        message: format!("failed to rename temp file: {e}"),
    })
}

fn read_definition(path: &Path) -> Result<FlowDefinition, FlowStoreError> {
    let data = std::fs::read(path).map_err(|e| FlowStoreError::Store {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_slice(&data).map_err(|e| FlowStoreError::Store {
        message: format!("failed to deserialize {}: {e}", path.display()),
    })
}

#[async_trait]
impl FlowStore for FileFlowStore {
    async fn put(&self, flow: &FlowDefinition) -> Result<(), FlowStoreError> {
        let path = self.path_for(&flow.id)?;
        let data = serde_json::to_vec_pretty(flow).map_err(|e| FlowStoreError::Store {
            message: format!("failed to serialize flow: {e}"),
        })?;
        atomic_write(&path, &data)
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowDefinition>, FlowStoreError> {
        let path = self.path_for(flow_id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_definition(&path).map(Some)
    }

    async fn delete(&self, flow_id: &str) -> Result<bool, FlowStoreError> {
        let path = self.path_for(flow_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FlowStoreError::Store {
                message: format!("failed to delete flow {flow_id}: {e}"),
            }),
        }
    }

    async fn list(&self, team_id: Option<&str>) -> Result<Vec<FlowDefinition>, FlowStoreError> {
        let entries = std::fs::read_dir(&self.flows_dir).map_err(|e| FlowStoreError::Store {
            message: format!("failed to read flows directory: {e}"),
        })?;

        let mut flows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FlowStoreError::Store {
                message: format!("failed to read dir entry: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_definition(&path) {
                Ok(flow) if team_id.map_or(true, |t| flow.team_id == t) => flows.push(flow),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable flow file"),
            }
        }
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(flows)
    }
}
