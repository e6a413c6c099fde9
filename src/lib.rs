//! llm-flow: compose LLM calls and tool invocations into workflows
//!
//! Tasks run in sequence or in parallel groups, branches fire when their
//! conditions hold, and lifecycle hooks report progress. See [`workflow`]
//! for the engine and [`tasks`] for the built-in executors.

pub mod cli;
pub mod config;
pub mod logging;
pub mod tasks;
pub mod workflow;

pub use config::WorkflowConfig;
pub use tasks::TaskExecutor;
pub use workflow::{
    ExecutionContext, FlowError, ParallelTask, RunOptions, Workflow, create_workflow,
};
