//! Workflow definition and run lifecycle

use super::context::ExecutionContext;
use super::error::FlowError;
use super::options::RunOptions;
use super::results::{ResultMap, TaskRecord};
use crate::config::WorkflowConfig;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Builder<I, O> =
    dyn Fn(ExecutionContext<I>) -> BoxFuture<'static, Result<O, FlowError>> + Send + Sync;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Everything a successful run produced
#[derive(Debug, Clone)]
pub struct RunReport<O> {
    /// Builder output, after validation
    pub output: O,

    /// Final result map of the root context
    pub results: ResultMap,

    /// Every task invocation, including those inside fired branches
    pub records: Vec<TaskRecord>,

    pub duration: Duration,
}

/// A named, reusable workflow
///
/// Runs are independent: each gets its own context, so one `Workflow` may be
/// run any number of times, including concurrently.
pub struct Workflow<I, O> {
    config: Arc<WorkflowConfig>,
    builder: Arc<Builder<I, O>>,
}

impl<I, O> Clone for Workflow<I, O> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            builder: self.builder.clone(),
        }
    }
}

impl<I, O> fmt::Debug for Workflow<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Create a workflow from a descriptor and a builder
///
/// Fails with [`FlowError::MissingName`] when the name is empty or blank.
pub fn create_workflow<I, O, F, Fut>(config: WorkflowConfig, builder: F) -> Result<Workflow<I, O>, FlowError>
where
    I: Serialize + Send + Sync + 'static,
    O: Serialize + Send + 'static,
    F: Fn(ExecutionContext<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, FlowError>> + Send + 'static,
{
    Workflow::new(config, builder)
}

impl<I, O> Workflow<I, O>
where
    I: Serialize + Send + Sync + 'static,
    O: Serialize + Send + 'static,
{
    pub fn new<F, Fut>(config: WorkflowConfig, builder: F) -> Result<Self, FlowError>
    where
        F: Fn(ExecutionContext<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, FlowError>> + Send + 'static,
    {
        config.validate()?;
        let builder: Arc<Builder<I, O>> = Arc::new(move |ctx| builder(ctx).boxed());

        Ok(Self {
            config: Arc::new(config),
            builder,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run the workflow with default options
    pub async fn run(&self, input: I) -> Result<O, FlowError> {
        self.run_with(input, RunOptions::default()).await
    }

    /// Run the workflow, validating its output and/or bounding its duration
    pub async fn run_with(&self, input: I, options: RunOptions<O>) -> Result<O, FlowError> {
        self.execute(input, options).await.map(|report| report.output)
    }

    /// Run the workflow and return its output along with the run's results and records
    ///
    /// A report only exists for a completed run; failures come back as `Err`.
    ///
    /// Hooks fire as follows: `on_workflow_start` first, then the task hooks
    /// as the builder runs, then `on_workflow_complete` on success. Any
    /// failure other than output validation is wrapped as
    /// [`FlowError::Workflow`] and passed to `on_error` exactly once before
    /// being returned. Validation failures are returned as
    /// [`FlowError::Validation`] without firing `on_error` or
    /// `on_workflow_complete`.
    pub async fn execute(&self, input: I, options: RunOptions<O>) -> Result<RunReport<O>, FlowError> {
        let started = Instant::now();
        let name = self.config.name.as_str();

        self.config.emit_workflow_start(&super::context::json_or_null(&input));
        tracing::info!(workflow = %name, state = %RunState::Running, "Workflow started");

        let ctx = ExecutionContext::new(input, self.config.clone());
        let build = (self.builder)(ctx.clone());

        let built = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, build).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FlowError::Timeout {
                    elapsed: started.elapsed(),
                }),
            },
            None => build.await,
        };

        let output = match built {
            Ok(output) => output,
            Err(e) => return Err(self.fail(e, started)),
        };

        let output = match options.output_schema {
            Some(validator) => validator.parse(output).map_err(|details| {
                tracing::warn!(workflow = %name, details = %details, "Workflow output rejected");
                FlowError::Validation { details }
            })?,
            None => output,
        };

        let rendered = match serde_json::to_value(&output) {
            Ok(value) => value,
            Err(e) => {
                let error = FlowError::Failed(format!("output is not representable as JSON: {}", e));
                return Err(self.fail(error, started));
            }
        };
        self.config.emit_workflow_complete(&rendered);

        let duration = started.elapsed();
        tracing::info!(
            workflow = %name,
            state = %RunState::Completed,
            tasks = ctx.records().len(),
            duration_ms = duration.as_millis() as u64,
            "Workflow completed"
        );

        Ok(RunReport {
            output,
            results: ctx.results(),
            records: ctx.records(),
            duration,
        })
    }

    /// Wrap a run failure, report it once, and hand it back
    fn fail(&self, error: FlowError, started: Instant) -> FlowError {
        let wrapped = error.into_workflow(&self.config.name);
        tracing::warn!(
            workflow = %self.config.name,
            state = %RunState::Failed,
            error = %wrapped,
            duration_ms = started.elapsed().as_millis() as u64,
            "Workflow failed"
        );
        self.config.emit_error(&wrapped);
        wrapped
    }
}
