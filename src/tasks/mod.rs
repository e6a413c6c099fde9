//! Task executors
//!
//! A task executor is the opaque `(input) -> output` unit of work a workflow
//! wraps. Any async closure returning `anyhow::Result<_>` is an executor;
//! this module also ships executors for shell commands, CLI-based LLM
//! programs and OpenAI-compatible HTTP endpoints, plus a retry wrapper.
//!
//! # Example
//!
//! ```ignore
//! use llm_flow::tasks::{ChatRequest, ChatTask, RetryPolicy, with_retry};
//!
//! let chat = with_retry(
//!     ChatTask::new("local", "http://localhost:11434/v1").with_model("qwen3"),
//!     RetryPolicy::default(),
//! );
//! let reply = ctx.task("summarize", chat, ChatRequest::new("Summarize ...")).await?;
//! ```

mod chat;
mod output_parser;
mod process;
mod retry;
mod types;

pub use chat::ChatTask;
pub use output_parser::extract_json;
pub use process::{CommandTask, ShellTask};
pub use retry::{RetryPolicy, Retrying, with_retry};
pub use types::{ChatRequest, ChatResponse, Recovery, TaskFailure, TokenUsage};

use crate::config::BackendSettings;
use async_trait::async_trait;
use std::future::Future;

/// An asynchronous unit of work wrapped by a workflow task
#[async_trait]
pub trait TaskExecutor<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Run the task to completion
    async fn execute(&self, input: In) -> anyhow::Result<Out>;
}

#[async_trait]
impl<F, Fut, In, Out> TaskExecutor<In, Out> for F
where
    F: Fn(In) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn execute(&self, input: In) -> anyhow::Result<Out> {
        (self)(input).await
    }
}

/// A configured LLM backend, either a CLI program or an HTTP endpoint
#[derive(Debug, Clone)]
pub enum BackendTask {
    Command(CommandTask),
    Chat(ChatTask),
}

#[async_trait]
impl TaskExecutor<ChatRequest, ChatResponse> for BackendTask {
    async fn execute(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        match self {
            BackendTask::Command(task) => task.execute(request).await,
            BackendTask::Chat(task) => task.execute(request).await,
        }
    }
}

/// Create an appropriate executor for a backend's settings
pub fn executor_for(name: &str, settings: &BackendSettings) -> BackendTask {
    if settings.is_http() {
        BackendTask::Chat(ChatTask::from_settings(name, settings))
    } else {
        BackendTask::Command(CommandTask::from_settings(name, settings))
    }
}
