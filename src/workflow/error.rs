//! Error types for workflow runs

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building or running a workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// Workflow constructed without a usable name
    #[error("name is required")]
    MissingName,

    /// A task executor (sequential or parallel member) failed
    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },

    /// The builder's output was rejected by the caller's validator
    #[error("Validation error: {details}")]
    Validation { details: String },

    /// Any other failure surfaced by `Workflow::run`
    #[error("Workflow '{workflow}' failed: {message}")]
    Workflow { workflow: String, message: String },

    /// Raised on purpose from a builder via `ExecutionContext::fail`
    #[error("{0}")]
    Failed(String),

    /// The run exceeded its opt-in timeout
    #[error("timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl FlowError {
    /// Wrap an executor failure under the task's name
    pub fn task(task: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::Task {
            task: task.into(),
            message: format!("{:#}", error),
        }
    }

    /// Wrap an arbitrary failure under the workflow's name.
    /// Errors that already carry a workflow name are returned unchanged.
    pub fn into_workflow(self, workflow: &str) -> Self {
        match self {
            wrapped @ FlowError::Workflow { .. } => wrapped,
            other => FlowError::Workflow {
                workflow: workflow.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Returns true for output validation failures
    pub fn is_validation(&self) -> bool {
        matches!(self, FlowError::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err = FlowError::task("validate", &anyhow::anyhow!("bad input"));
        assert_eq!(err.to_string(), "Task 'validate' failed: bad input");
    }

    #[test]
    fn test_task_error_keeps_context_chain() {
        let source = anyhow::anyhow!("connection reset").context("fetching issue");
        let err = FlowError::task("fetch", &source);
        assert_eq!(
            err.to_string(),
            "Task 'fetch' failed: fetching issue: connection reset"
        );
    }

    #[test]
    fn test_workflow_wrapping() {
        let err = FlowError::task("validate", &anyhow::anyhow!("bad input")).into_workflow("W");
        assert_eq!(
            err.to_string(),
            "Workflow 'W' failed: Task 'validate' failed: bad input"
        );
    }

    #[test]
    fn test_workflow_wrapping_is_idempotent() {
        let err = FlowError::Failed("boom".into())
            .into_workflow("inner")
            .into_workflow("outer");
        assert_eq!(err.to_string(), "Workflow 'inner' failed: boom");
    }

    #[test]
    fn test_validation_display() {
        let err = FlowError::Validation {
            details: "missing required property 'sum'".into(),
        };
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Validation error"));
    }

    #[test]
    fn test_missing_name_display() {
        assert_eq!(FlowError::MissingName.to_string(), "name is required");
    }
}
