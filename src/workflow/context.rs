//! Per-run execution context handed to workflow builders

use super::branch::{BranchBuilder, ConditionalBranch};
use super::error::FlowError;
use super::results::{ResultMap, TaskRecord};
use crate::config::WorkflowConfig;
use crate::tasks::TaskExecutor;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lock a run-scoped mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the state of one workflow run
///
/// Cloning is cheap and every clone refers to the same run. A context is
/// created fresh by each `Workflow::run`, so concurrent runs never share
/// results, records or pending branches.
pub struct ExecutionContext<I> {
    input: Arc<I>,
    config: Arc<WorkflowConfig>,
    results: Arc<Mutex<ResultMap>>,
    records: Arc<Mutex<Vec<TaskRecord>>>,
    branches: Arc<Mutex<Vec<ConditionalBranch<I>>>>,
}

impl<I> Clone for ExecutionContext<I> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            config: self.config.clone(),
            results: self.results.clone(),
            records: self.records.clone(),
            branches: self.branches.clone(),
        }
    }
}

impl<I> ExecutionContext<I>
where
    I: Send + Sync + 'static,
{
    pub(crate) fn new(input: I, config: Arc<WorkflowConfig>) -> Self {
        Self {
            input: Arc::new(input),
            config,
            results: Arc::new(Mutex::new(ResultMap::new())),
            records: Arc::new(Mutex::new(Vec::new())),
            branches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Context for a fired branch: same input and hooks, fresh result map.
    /// Task records roll up into the parent run.
    fn child(&self) -> Self {
        Self {
            input: self.input.clone(),
            config: self.config.clone(),
            results: Arc::new(Mutex::new(ResultMap::new())),
            records: self.records.clone(),
            branches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The input the workflow was run with
    pub fn input(&self) -> &I {
        &self.input
    }

    /// Name of the running workflow
    pub fn workflow_name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Snapshot of the results recorded so far
    pub fn results(&self) -> ResultMap {
        lock(&self.results).clone()
    }

    /// Latest result recorded under `name`
    pub fn result(&self, name: &str) -> Option<Value> {
        lock(&self.results).get(name).cloned()
    }

    /// Snapshot of every task invocation in this run, in invocation order
    pub fn records(&self) -> Vec<TaskRecord> {
        lock(&self.records).clone()
    }

    /// Number of registered branches that have not fired yet
    pub fn pending_branches(&self) -> usize {
        lock(&self.branches).len()
    }

    /// Run one task to completion and record its result under `name`.
    ///
    /// On success the result is stored (overwriting any earlier result with
    /// the same name), `on_task_complete` fires, and every pending branch is
    /// checked against the updated results. An executor error is returned as
    /// [`FlowError::Task`]; a failing branch error is returned unchanged.
    pub async fn task<E, In, Out>(
        &self,
        name: impl Into<String>,
        executor: E,
        input: In,
    ) -> Result<Out, FlowError>
    where
        E: TaskExecutor<In, Out>,
        In: Serialize + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let name = name.into();
        let index = self.start_record(&name, json_or_null(&input));
        let started = Instant::now();

        let output = executor.execute(input).await.map_err(|e| {
            tracing::warn!(
                workflow = %self.config.name,
                task = %name,
                error = %format!("{:#}", e),
                "Task failed"
            );
            FlowError::task(&name, &e)
        })?;

        let value = serde_json::to_value(&output).map_err(|e| FlowError::Task {
            task: name.clone(),
            message: format!("result is not representable as JSON: {}", e),
        })?;

        self.finish_record(index, &value, started.elapsed());
        self.record_result(&name, value);
        self.fire_branches().await?;

        Ok(output)
    }

    /// Register a branch that runs once, the first time `predicate` holds
    /// after a sequential task completes.
    ///
    /// The predicate sees the results recorded so far; an error or panic
    /// counts as "not yet". A fired branch runs on a child context whose
    /// results are merged back into this one. Its output is discarded.
    pub fn when<P, B, Fut, T>(&self, predicate: P, builder: B) -> &Self
    where
        P: Fn(&ResultMap) -> anyhow::Result<bool> + Send + Sync + 'static,
        B: FnOnce(ExecutionContext<I>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
        T: Send + 'static,
    {
        let builder: BranchBuilder<I> =
            Box::new(move |ctx| builder(ctx).map(|outcome| outcome.map(|_| ())).boxed());
        lock(&self.branches).push(ConditionalBranch::new(Box::new(predicate), builder));
        self
    }

    /// Finish the builder successfully with `value`
    pub fn success<T>(&self, value: T) -> Result<T, FlowError> {
        Ok(value)
    }

    /// Finish the builder with a failure carrying `message`
    pub fn fail<T>(&self, message: impl Into<String>) -> Result<T, FlowError> {
        Err(FlowError::Failed(message.into()))
    }

    pub(crate) fn start_record(&self, name: &str, input: Value) -> usize {
        self.config.emit_task_start(name);
        tracing::debug!(workflow = %self.config.name, task = %name, "Task started");

        let mut records = lock(&self.records);
        records.push(TaskRecord::new(name, input));
        records.len() - 1
    }

    pub(crate) fn finish_record(&self, index: usize, result: &Value, elapsed: Duration) {
        let mut records = lock(&self.records);
        if let Some(record) = records.get_mut(index) {
            record.result = Some(result.clone());
            record.duration_ms = Some(elapsed.as_millis() as u64);
        }
    }

    /// Store a result and fire `on_task_complete`
    pub(crate) fn record_result(&self, name: &str, value: Value) {
        lock(&self.results).insert(name, value.clone());
        tracing::debug!(workflow = %self.config.name, task = %name, "Task completed");
        self.config.emit_task_complete(name, &value);
    }

    /// Fire every pending branch whose predicate now holds, in registration order
    async fn fire_branches(&self) -> Result<(), FlowError> {
        let pending = std::mem::take(&mut *lock(&self.branches));
        if pending.is_empty() {
            return Ok(());
        }

        let mut waiting = Vec::new();
        let mut outcome = Ok(());
        let mut snapshot = self.results();
        let mut pending = pending.into_iter();

        for branch in pending.by_ref() {
            if !branch.matches(&snapshot) {
                waiting.push(branch);
                continue;
            }
            if let Err(e) = self.run_branch(branch).await {
                outcome = Err(e);
                break;
            }
            snapshot = self.results();
        }
        waiting.extend(pending);

        // Unfired branches keep their place ahead of any registered meanwhile
        let mut branches = lock(&self.branches);
        let registered = std::mem::replace(&mut *branches, waiting);
        branches.extend(registered);

        outcome
    }

    async fn run_branch(&self, branch: ConditionalBranch<I>) -> Result<(), FlowError> {
        tracing::debug!(workflow = %self.config.name, "Branch condition met");

        let child = self.child();
        (branch.into_builder())(child.clone()).await?;

        let produced = std::mem::take(&mut *lock(&child.results));
        lock(&self.results).merge(produced);
        Ok(())
    }
}

/// JSON form of a task input for its record; inputs with no JSON form are recorded as null
pub(crate) fn json_or_null<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
