//! Configuration types and loading for llm-flow

mod loader;
mod schema;
mod workflow;

pub use loader::{BackendSettings, Defaults, RetrySettings, Settings};
pub use schema::{OutputSchema, PropertySchema};
pub use workflow::{ErrorHook, TaskStartHook, ValueHook, WorkflowConfig};
