//! Workflow execution engine for llm-flow
//!
//! A workflow is a named async builder that drives tasks through an
//! [`ExecutionContext`]:
//! - `task` runs one executor and records its result by name
//! - `parallel` runs a group of executors concurrently
//! - `when` registers a branch that fires once its predicate holds
//! - `success` / `fail` finish the builder
//!
//! Every run gets its own context, so a [`Workflow`] can be run repeatedly
//! and concurrently.
//!
//! # Example
//!
//! ```ignore
//! use llm_flow::config::WorkflowConfig;
//! use llm_flow::workflow::{ExecutionContext, create_workflow};
//!
//! let sum = create_workflow(WorkflowConfig::new("Sum"), |w: ExecutionContext<(i64, i64)>| async move {
//!     let (x, y) = *w.input();
//!     let total = w.task("add", |(a, b): (i64, i64)| async move { anyhow::Ok(a + b) }, (x, y)).await?;
//!     w.success(total)
//! })?;
//!
//! assert_eq!(sum.run((2, 3)).await?, 5);
//! ```

mod branch;
mod context;
mod error;
mod options;
mod parallel;
mod results;
mod runner;

pub use context::ExecutionContext;
pub use error::FlowError;
pub use options::{OutputValidator, RunOptions};
pub use parallel::ParallelTask;
pub use results::{ResultMap, TaskRecord};
pub use runner::{RunReport, RunState, Workflow, create_workflow};
