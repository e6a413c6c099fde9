//! Concurrent task groups

use super::context::{ExecutionContext, json_or_null};
use super::error::FlowError;
use crate::tasks::TaskExecutor;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

type Launch = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// One member of a `parallel` group: a name, an executor and its input
///
/// Members may wrap different executor and input types; results are
/// collected as JSON.
pub struct ParallelTask {
    name: String,
    input: Value,
    launch: Launch,
}

impl ParallelTask {
    pub fn new<E, In, Out>(name: impl Into<String>, executor: E, input: In) -> Self
    where
        E: TaskExecutor<In, Out> + 'static,
        In: Serialize + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let recorded = json_or_null(&input);
        let launch: Launch = Box::new(move || {
            async move {
                let output = executor.execute(input).await?;
                serde_json::to_value(&output).map_err(|e| {
                    anyhow::anyhow!("result is not representable as JSON: {}", e)
                })
            }
            .boxed()
        });

        Self {
            name: name.into(),
            input: recorded,
            launch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ParallelTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelTask")
            .field("name", &self.name)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

impl<I> ExecutionContext<I>
where
    I: Send + Sync + 'static,
{
    /// Run a group of tasks concurrently and wait for all of them.
    ///
    /// `on_task_start` fires for every member, in list order, before any of
    /// them runs. Once all succeed their results are recorded and
    /// `on_task_complete` fires, both in list order; the returned values
    /// follow list order too. The first member to fail ends the group with
    /// [`FlowError::Task`]. Remaining members keep running in the background
    /// and their outcome is discarded, unless the workflow was configured to
    /// cancel siblings.
    ///
    /// Pending branches are not evaluated after a parallel group; they wait
    /// for the next sequential task.
    pub async fn parallel(&self, tasks: Vec<ParallelTask>) -> Result<Vec<Value>, FlowError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut names = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in &tasks {
            names.push(task.name.clone());
        }
        let indices: Vec<usize> = tasks
            .iter()
            .map(|task| self.start_record(&task.name, task.input.clone()))
            .collect();

        for task in tasks {
            let running = (task.launch)();
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let outcome = running.await;
                (outcome, started.elapsed())
            }));
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(i, handle)| async move { (i, handle.await) })
            .collect();

        let mut settled: Vec<Option<(Value, Duration)>> = vec![None; names.len()];

        while let Some((i, joined)) = pending.next().await {
            let failure = match joined {
                Ok((Ok(value), elapsed)) => {
                    settled[i] = Some((value, elapsed));
                    continue;
                }
                Ok((Err(e), _)) => FlowError::task(&names[i], &e),
                Err(join_error) => FlowError::Task {
                    task: names[i].clone(),
                    message: join_error.to_string(),
                },
            };

            tracing::warn!(
                workflow = %self.workflow_name(),
                task = %names[i],
                error = %failure,
                still_running = pending.len(),
                "Parallel task failed"
            );
            if self.config().cancel_siblings_on_failure {
                for abort in &aborts {
                    abort.abort();
                }
            }
            return Err(failure);
        }

        let mut values = Vec::with_capacity(names.len());
        for ((name, index), outcome) in names.iter().zip(indices).zip(settled) {
            let (value, elapsed) = outcome.unwrap_or_default();
            self.finish_record(index, &value, elapsed);
            self.record_result(name, value.clone());
            values.push(value);
        }

        Ok(values)
    }
}
