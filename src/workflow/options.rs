//! Per-run options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Validates (and may normalize) a workflow's output before it is returned
pub trait OutputValidator<T>: Send + Sync {
    /// Return the accepted value, or a description of what is wrong with it
    fn parse(&self, value: T) -> Result<T, String>;
}

impl<T, F> OutputValidator<T> for F
where
    F: Fn(T) -> Result<T, String> + Send + Sync,
{
    fn parse(&self, value: T) -> Result<T, String> {
        (self)(value)
    }
}

/// Options for a single `Workflow::run_with` call
pub struct RunOptions<O> {
    /// Validator applied to the builder's output
    pub output_schema: Option<Arc<dyn OutputValidator<O>>>,

    /// Give up on the run after this long
    pub timeout: Option<Duration>,
}

impl<O> Default for RunOptions<O> {
    fn default() -> Self {
        Self {
            output_schema: None,
            timeout: None,
        }
    }
}

impl<O> Clone for RunOptions<O> {
    fn clone(&self) -> Self {
        Self {
            output_schema: self.output_schema.clone(),
            timeout: self.timeout,
        }
    }
}

impl<O> RunOptions<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, validator: impl OutputValidator<O> + 'static) -> Self {
        self.output_schema = Some(Arc::new(validator));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<O> fmt::Debug for RunOptions<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("output_schema", &self.output_schema.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
