//! Opt-in retry wrapper with exponential backoff
//!
//! The workflow engine never retries on its own. Wrap an executor in
//! [`Retrying`] to retry transient [`TaskFailure`]s; any other error is
//! returned on the first attempt.

use super::TaskExecutor;
use super::types::{Recovery, TaskFailure};
use crate::config::RetrySettings;
use async_trait::async_trait;
use std::marker::PhantomData;
use std::time::Duration;

/// Exponential backoff between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Shave up to a quarter off each delay so parallel callers spread out
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    /// Policy for the `[retry]` settings section
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter: settings.jitter,
        }
    }

    /// Wait before retry number `attempt` (0-based), never above `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if self.jitter {
            secs *= 1.0 - rand::random::<f64>() * 0.25;
        }

        // Settings are validated on load; a hand-built policy may still be nonsense
        let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, ceiling) };
        Duration::from_secs_f64(secs)
    }
}

/// Wrapper that adds retry logic to any executor with a cloneable input
pub struct Retrying<E, In, Out> {
    inner: E,
    policy: RetryPolicy,
    _io: PhantomData<fn(In) -> Out>,
}

impl<E: Clone, In, Out> Clone for Retrying<E, In, Out> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: self.policy.clone(),
            _io: PhantomData,
        }
    }
}

impl<E, In, Out> Retrying<E, In, Out>
where
    E: TaskExecutor<In, Out>,
    In: Clone + Send + 'static,
    Out: Send + 'static,
{
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            _io: PhantomData,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<E, In, Out> TaskExecutor<In, Out> for Retrying<E, In, Out>
where
    E: TaskExecutor<In, Out>,
    In: Clone + Send + 'static,
    Out: Send + 'static,
{
    async fn execute(&self, input: In) -> anyhow::Result<Out> {
        let mut attempt = 0;
        loop {
            let err = match self.inner.execute(input.clone()).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            let recovery = err
                .downcast_ref::<TaskFailure>()
                .map_or(Recovery::GiveUp, TaskFailure::recovery);
            let delay = match recovery {
                Recovery::GiveUp => return Err(err),
                _ if attempt >= self.policy.max_retries => return Err(err),
                Recovery::Backoff => self.policy.backoff(attempt),
                Recovery::WaitFor(wait) => wait.min(self.policy.max_delay),
            };

            tracing::warn!(
                attempt = attempt + 1,
                max_retries = self.policy.max_retries,
                ?delay,
                error = %err,
                "Retrying task after transient failure"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Wrap an executor with a retry policy
pub fn with_retry<E, In, Out>(executor: E, policy: RetryPolicy) -> Retrying<E, In, Out>
where
    E: TaskExecutor<In, Out>,
    In: Clone + Send + 'static,
    Out: Send + 'static,
{
    Retrying::new(executor, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::workflow::{ExecutionContext, create_workflow};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    /// Executor that fails `fail_times` times with `failure` before succeeding
    fn flaky(
        fail_times: u32,
        failure: TaskFailure,
        calls: Arc<AtomicU32>,
    ) -> impl Fn(String) -> futures::future::BoxFuture<'static, anyhow::Result<String>> + Clone + Send + Sync
    {
        move |input: String| {
            let calls = calls.clone();
            let failure = failure.clone();
            let attempt: futures::future::BoxFuture<'static, anyhow::Result<String>> =
                Box::pin(async move {
                    let count = calls.fetch_add(1, Ordering::SeqCst);
                    if count < fail_times {
                        Err(anyhow::Error::from(failure))
                    } else {
                        Ok(format!("done: {}", input))
                    }
                });
            attempt
        }
    }

    fn reset() -> TaskFailure {
        TaskFailure::Transport("connection reset".into())
    }

    #[tokio::test]
    async fn test_retried_task_records_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let starts = Arc::new(AtomicU32::new(0));
        let counter = starts.clone();
        let config = WorkflowConfig::new("fetch").on_task_start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let executor = with_retry(flaky(2, reset(), calls.clone()), fast_policy(3));
        let workflow = create_workflow(config, move |w: ExecutionContext<String>| {
            let executor = executor.clone();
            async move {
                let page = w.task("download", executor, w.input().clone()).await?;
                w.success(page)
            }
        })
        .unwrap();

        let report = workflow.execute("page".into(), Default::default()).await.unwrap();
        assert_eq!(report.output, "done: page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(report.records.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_workflow() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = with_retry(flaky(10, reset(), calls.clone()), fast_policy(2));
        let workflow = create_workflow(WorkflowConfig::new("fetch"), move |w: ExecutionContext<String>| {
            let executor = executor.clone();
            async move {
                let page = w.task("download", executor, w.input().clone()).await?;
                w.success(page)
            }
        })
        .unwrap();

        let err = workflow.run("page".into()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Workflow 'fetch' failed: Task 'download' failed: transport error: connection reset"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let unauthorized = TaskFailure::Status {
            status: 401,
            body: "invalid token".into(),
            retry_after: None,
        };
        let executor = with_retry(flaky(10, unauthorized, calls.clone()), fast_policy(5));

        assert!(executor.execute("job".to_string()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untyped_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let executor = with_retry(
            move |_: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<String, _>(anyhow::anyhow!("bad input")) }
            },
            fast_policy(5),
        );

        let err = executor.execute("job".to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_wait_is_capped() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttled = TaskFailure::Status {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(3600)),
        };
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(5),
            ..fast_policy(1)
        };
        let executor = with_retry(flaky(1, throttled, calls.clone()), policy);

        let output = tokio::time::timeout(Duration::from_secs(5), executor.execute("job".into()))
            .await
            .expect("wait should be capped by max_delay")
            .unwrap();
        assert_eq!(output, "done: job");
    }

    #[test]
    fn test_backoff_grows_to_ceiling() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };

        let delays: Vec<_> = (0..4).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_only_shortens() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            jitter: true,
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = policy.backoff(0);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_nonsense_multiplier_stays_in_range() {
        let settings: RetrySettings =
            toml::from_str("backoff_multiplier = -1.0\njitter = false").unwrap();
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.backoff(1), Duration::ZERO);

        let policy = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..policy
        };
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }
}
