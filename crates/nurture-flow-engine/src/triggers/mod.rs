//! Trigger registry and matcher.
//!
//! The [`TriggerRegistry`] is a process-local index of active flows by
//! trigger type. It is volatile: the engine rebuilds it from the flow store
//! at startup and keeps it in sync on activate, deactivate and delete.
//! [`matches`] evaluates the trigger-specific predicate for one event.

mod matcher;
mod registry;

pub use matcher::matches;
pub use registry::{TriggerRegistration, TriggerRegistry};
