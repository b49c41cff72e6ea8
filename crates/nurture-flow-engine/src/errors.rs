//! Error types for the collaborator and store traits.

use thiserror::Error;

/// Errors from [`FlowStore`](super::traits::FlowStore).
#[derive(Debug, Error)]
pub enum FlowStoreError {
    #[error("flow not found: {id}")]
    NotFound { id: String },
    #[error("flow store error: {message}")]
    Store { message: String },
}

/// Errors from [`ExecutionStore`](super::traits::ExecutionStore).
#[derive(Debug, Error)]
pub enum ExecutionStoreError {
    #[error("execution not found: {id}")]
    NotFound { id: String },
    /// A non-terminal execution already exists for the (flow, contact) pair.
    #[error("execution {existing_id} is already active for flow {flow_id} and contact {contact_id}")]
    AlreadyActive {
        flow_id: String,
        contact_id: String,
        existing_id: String,
    },
    /// The guarded update lost: the stored revision moved on.
    #[error("execution {id} changed concurrently (expected revision {expected}, found {actual})")]
    Conflict { id: String, expected: u64, actual: u64 },
    #[error("execution store error: {message}")]
    Store { message: String },
}

/// Errors from [`ContactStore`](super::traits::ContactStore).
#[derive(Debug, Error)]
pub enum ContactStoreError {
    #[error("contact not found: {id}")]
    NotFound { id: String },
    #[error("contact store error: {message}")]
    Store { message: String },
}

/// Errors from [`MessagingGateway`](super::traits::MessagingGateway).
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("messaging error: {message}")]
    Send { message: String },
}

/// Errors from [`AiCompletion`](super::traits::AiCompletion).
#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI provider error: {message}")]
    Provider { message: String },
    #[error("no AI completion provider configured")]
    NotConfigured,
}

/// Errors from [`HttpCaller`](super::traits::HttpCaller).
#[derive(Debug, Error)]
pub enum HttpCallError {
    #[error("HTTP request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("HTTP transport error: {message}")]
    Transport { message: String },
    #[error("HTTP request is invalid: {message}")]
    InvalidRequest { message: String },
}

impl HttpCallError {
    /// Transport failures and timeouts are worth retrying; malformed requests
    /// are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HttpCallError::InvalidRequest { .. })
    }
}
