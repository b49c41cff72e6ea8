//! Nurture flow engine: per-contact automation flows for a CRM.
//!
//! A flow is a directed graph of typed nodes (send a message, wait, branch,
//! tag a contact, call a webhook, ask an AI model) entered through exactly
//! one trigger. This crate validates flow definitions, routes inbound
//! events to the flow whose trigger matches, and drives each contact's
//! execution as a persisted state machine that can suspend on a Wait node
//! and be resumed later by the [`ResumeScheduler`].
//!
//! The engine is embedded in a host application. Storage, messaging, AI
//! and HTTP are reached through the traits in [`traits`]; [`defaults`]
//! provides in-process implementations so the engine runs with zero
//! external configuration.

pub mod condition;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod graph;
pub(crate) mod handlers;
pub mod scheduler;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod traits;
pub mod triggers;
pub mod types;
pub mod validate;
pub mod versioning;

// Re-export public types at the crate level.

// config
pub use config::{ConfigError, EngineConfig};

// defaults
pub use defaults::{
    BroadcastNotifier, FileFlowStore, InMemoryContactStore, InMemoryExecutionStore, InMemoryFlowStore,
    ReqwestHttpCaller, TracingMessagingGateway,
};

// engine
pub use engine::{EngineError, FireOutcome, FlowEngine, FlowEngineBuilder};

// errors
pub use errors::{AiError, ContactStoreError, ExecutionStoreError, FlowStoreError, HttpCallError, MessagingError};

// executor
pub use executor::{Executor, ExecutorError, Services};

// scheduler
pub use scheduler::{ResumeScheduler, TickReport};

// traits
pub use traits::{
    AiCompletion, AiRequest, ChatRole, ChatTurn, ContactStore, ExecutionFilter, ExecutionPage, ExecutionStore,
    FlowStore, HttpCall, HttpCaller, HttpReply, MessagingGateway, NoopNotifier, NotificationSink, OutboundMessage,
};

// triggers
pub use triggers::{TriggerRegistration, TriggerRegistry};

// types
pub use types::*;

// validate / template / versioning
pub use template::render;
pub use validate::{validate_flow, ValidationReport};
pub use versioning::compute_definition_hash;
