//! Conditional branches registered with `ExecutionContext::when`

use super::context::ExecutionContext;
use super::error::FlowError;
use super::results::ResultMap;
use futures::future::BoxFuture;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub(crate) type Predicate = Box<dyn Fn(&ResultMap) -> anyhow::Result<bool> + Send + Sync>;

pub(crate) type BranchBuilder<I> =
    Box<dyn FnOnce(ExecutionContext<I>) -> BoxFuture<'static, Result<(), FlowError>> + Send>;

/// A branch waiting for its predicate to hold
pub(crate) struct ConditionalBranch<I> {
    predicate: Predicate,
    builder: BranchBuilder<I>,
}

impl<I> ConditionalBranch<I> {
    pub(crate) fn new(predicate: Predicate, builder: BranchBuilder<I>) -> Self {
        Self { predicate, builder }
    }

    /// Evaluate the predicate. Errors and panics count as "not yet".
    pub(crate) fn matches(&self, results: &ResultMap) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(results))) {
            Ok(Ok(matched)) => matched,
            Ok(Err(e)) => {
                tracing::debug!(error = %format!("{:#}", e), "Branch predicate failed, treating as false");
                false
            }
            Err(_) => {
                tracing::warn!("Branch predicate panicked, treating as false");
                false
            }
        }
    }

    pub(crate) fn into_builder(self) -> BranchBuilder<I> {
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn branch(predicate: Predicate) -> ConditionalBranch<()> {
        ConditionalBranch::new(predicate, Box::new(|_| Box::pin(async { Ok::<(), FlowError>(()) })))
    }

    #[test]
    fn test_predicate_true_and_false() {
        let mut results = ResultMap::new();
        results.insert("score", json!(9));

        let high = branch(Box::new(|r| Ok(r.get_as::<i64>("score")? > 5)));
        let low = branch(Box::new(|r| Ok(r.get_as::<i64>("score")? < 5)));

        assert!(high.matches(&results));
        assert!(!low.matches(&results));
    }

    #[test]
    fn test_predicate_error_is_false() {
        let missing = branch(Box::new(|r| Ok(r.require("absent")?.is_string())));
        assert!(!missing.matches(&ResultMap::new()));
    }

    #[test]
    fn test_predicate_panic_is_false() {
        let panicking = branch(Box::new(|r| Ok(r.get("absent").expect("present").is_null())));
        assert!(!panicking.matches(&ResultMap::new()));
    }
}
