//! Default implementations for every pluggable seam.
//!
//! These let the engine start with zero external configuration. Each can
//! be replaced via [`FlowEngineBuilder`](crate::engine::FlowEngineBuilder).

pub mod broadcast_notifier;
pub mod file_flow_store;
pub mod in_memory_contacts;
pub mod in_memory_execution_store;
pub mod in_memory_flow_store;
pub mod reqwest_http;
pub mod tracing_messaging;

pub use broadcast_notifier::BroadcastNotifier;
pub use file_flow_store::FileFlowStore;
pub use in_memory_contacts::InMemoryContactStore;
pub use in_memory_execution_store::InMemoryExecutionStore;
pub use in_memory_flow_store::InMemoryFlowStore;
pub use reqwest_http::ReqwestHttpCaller;
pub use tracing_messaging::TracingMessagingGateway;
