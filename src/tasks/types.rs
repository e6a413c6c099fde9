//! Failures and chat payloads shared by the built-in executors

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a built-in executor gave up
///
/// Executors return these inside `anyhow::Error`. [`Retrying`] downcasts to
/// read [`TaskFailure::recovery`]; anything else is treated as permanent.
///
/// [`Retrying`]: super::Retrying
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskFailure {
    /// The program could not be spawned or waited on
    #[error("cannot run '{program}': {reason}")]
    Launch { program: String, reason: String },

    /// The program ran and exited unsuccessfully
    #[error("'{program}' exited with {}: {stderr}", exit_label(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// No reply before the executor's own deadline
    #[error("no reply within {limit:?}")]
    Deadline { limit: Duration },

    /// The endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),

    /// The answer was not a chat completion
    #[error("malformed reply: {0}")]
    Malformed(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// What a retry wrapper should do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Permanent: another attempt would fail the same way
    GiveUp,
    /// Transient: wait out the policy's backoff and try again
    Backoff,
    /// Transient, and the server said how long to wait
    WaitFor(Duration),
}

impl TaskFailure {
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Deadline { .. } | Self::Transport(_) => Recovery::Backoff,
            Self::Status {
                status: 429,
                retry_after: Some(wait),
                ..
            } => Recovery::WaitFor(*wait),
            Self::Status { status, .. } if matches!(*status, 408 | 429 | 500..=599) => Recovery::Backoff,
            Self::Status { .. } | Self::Launch { .. } | Self::Exit { .. } | Self::Malformed(_) => {
                Recovery::GiveUp
            }
        }
    }
}

/// Prompt sent to an LLM executor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User prompt
    pub prompt: String,

    /// System prompt (if supported)
    pub system: Option<String>,

    /// Per-request timeout override
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&str> for ChatRequest {
    fn from(prompt: &str) -> Self {
        Self::new(prompt)
    }
}

impl From<String> for ChatRequest {
    fn from(prompt: String) -> Self {
        Self::new(prompt)
    }
}

/// Reply from an LLM executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Raw text output
    pub text: String,

    /// JSON extracted from the text, if any
    pub structured: Option<serde_json::Value>,

    /// Backend that produced this response
    pub backend: String,

    /// Model used (if known)
    pub model: Option<String>,

    /// Time taken in milliseconds
    pub duration_ms: u64,

    /// Token usage (if available)
    pub usage: Option<TokenUsage>,
}

/// Token usage information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ChatResponse {
    pub fn new(text: String, backend: String, duration: Duration) -> Self {
        Self {
            text,
            structured: None,
            backend,
            model: None,
            duration_ms: duration.as_millis() as u64,
            usage: None,
        }
    }

    pub fn with_structured(mut self, structured: serde_json::Value) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}
