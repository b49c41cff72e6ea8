//! Engine error types.

use thiserror::Error;

use crate::errors::{ExecutionStoreError, FlowStoreError};
use crate::executor::ExecutorError;

/// Errors from [`FlowEngine`](super::FlowEngine) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The definition failed validation; nothing was persisted.
    #[error("invalid flow definition: {}", errors.join("; "))]
    InvalidDefinition { errors: Vec<String> },
    #[error("flow not found: {flow_id}")]
    FlowNotFound { flow_id: String },
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("flow store error: {0}")]
    FlowStore(#[from] FlowStoreError),
    #[error("execution store error: {0}")]
    ExecutionStore(#[from] ExecutionStoreError),
    /// An error during engine construction.
    #[error("build error: {message}")]
    Build { message: String },
}
