//! Workflow descriptor and lifecycle callbacks

use crate::workflow::FlowError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Called with a task's name before its executor runs
pub type TaskStartHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with a name and a JSON value (task result, workflow input or output)
pub type ValueHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Called once with the wrapped error of a failed run
pub type ErrorHook = Arc<dyn Fn(&FlowError) + Send + Sync>;

/// Static description of a workflow plus optional lifecycle callbacks
///
/// Callbacks fire synchronously on the run's control flow, so they should
/// return quickly.
#[derive(Clone, Default)]
pub struct WorkflowConfig {
    /// Workflow name, required and non-blank
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Abort still-running parallel members once one of them fails.
    /// Off by default: siblings run to completion and their outcome is discarded.
    pub cancel_siblings_on_failure: bool,

    pub on_task_start: Option<TaskStartHook>,
    pub on_task_complete: Option<ValueHook>,
    pub on_workflow_start: Option<ValueHook>,
    pub on_workflow_complete: Option<ValueHook>,
    pub on_error: Option<ErrorHook>,
}

impl WorkflowConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn cancel_siblings_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_siblings_on_failure = cancel;
        self
    }

    pub fn on_task_start(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_task_start = Some(Arc::new(hook));
        self
    }

    pub fn on_task_complete(mut self, hook: impl Fn(&str, &Value) + Send + Sync + 'static) -> Self {
        self.on_task_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_workflow_start(
        mut self,
        hook: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_workflow_start = Some(Arc::new(hook));
        self
    }

    pub fn on_workflow_complete(
        mut self,
        hook: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.on_workflow_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&FlowError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Check the descriptor is usable
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::MissingName);
        }
        Ok(())
    }

    pub(crate) fn emit_task_start(&self, task: &str) {
        if let Some(ref hook) = self.on_task_start {
            hook(task);
        }
    }

    pub(crate) fn emit_task_complete(&self, task: &str, result: &Value) {
        if let Some(ref hook) = self.on_task_complete {
            hook(task, result);
        }
    }

    pub(crate) fn emit_workflow_start(&self, input: &Value) {
        if let Some(ref hook) = self.on_workflow_start {
            hook(&self.name, input);
        }
    }

    pub(crate) fn emit_workflow_complete(&self, output: &Value) {
        if let Some(ref hook) = self.on_workflow_complete {
            hook(&self.name, output);
        }
    }

    pub(crate) fn emit_error(&self, error: &FlowError) {
        if let Some(ref hook) = self.on_error {
            hook(error);
        }
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<&str> = [
            ("on_task_start", self.on_task_start.is_some()),
            ("on_task_complete", self.on_task_complete.is_some()),
            ("on_workflow_start", self.on_workflow_start.is_some()),
            ("on_workflow_complete", self.on_workflow_complete.is_some()),
            ("on_error", self.on_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        f.debug_struct("WorkflowConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("cancel_siblings_on_failure", &self.cancel_siblings_on_failure)
            .field("hooks", &hooks)
            .finish()
    }
}
