//! OpenAI-compatible HTTP chat executor

use super::TaskExecutor;
use super::output_parser::extract_json;
use super::types::{ChatRequest, ChatResponse, TaskFailure, TokenUsage};
use crate::config::BackendSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Executor for OpenAI-compatible chat completion endpoints
#[derive(Debug, Clone)]
pub struct ChatTask {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl ChatTask {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: None,
            timeout: Duration::from_secs(300),
            client: reqwest::Client::new(),
        }
    }

    /// Create from a `[backends.<name>]` settings entry.
    /// The API key is read from the variable named by `api_key_env`.
    pub fn from_settings(name: impl Into<String>, settings: &BackendSettings) -> Self {
        let api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());

        Self {
            name: name.into(),
            base_url: settings.command.clone(),
            api_key,
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completion_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Map a non-success HTTP status onto a task failure
    fn map_status(&self, status: reqwest::StatusCode, body: &str) -> TaskFailure {
        let retry_after = match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => parse_retry_after(body),
            _ => None,
        };
        TaskFailure::Status {
            status: status.as_u16(),
            body: body.to_string(),
            retry_after,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, TaskFailure> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        let body = CompletionRequest {
            model: self.model.as_deref().unwrap_or(DEFAULT_MODEL),
            messages,
        };

        let mut http_request = self.client.post(self.completion_url()).json(&body);
        if let Some(ref key) = self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let timeout = request.timeout.unwrap_or(self.timeout);
        let response = match tokio::time::timeout(timeout, http_request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(TaskFailure::Deadline { limit: timeout }),
            Ok(Err(e)) if e.is_connect() => {
                return Err(TaskFailure::Transport(format!("connection failed: {}", e)));
            }
            Ok(Err(e)) => return Err(TaskFailure::Transport(e.to_string())),
            Err(_) => return Err(TaskFailure::Deadline { limit: timeout }),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status(status, &body));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| TaskFailure::Malformed(e.to_string()))?;

        Ok(self.to_response(completion, start.elapsed()))
    }

    fn to_response(&self, completion: CompletionResponse, elapsed: Duration) -> ChatResponse {
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let mut response = ChatResponse::new(text, self.name.clone(), elapsed);
        if let Some(json) = extract_json(&response.text) {
            response = response.with_structured(json);
        }
        if let Some(model) = completion.model {
            response = response.with_model(model);
        }
        if let Some(usage) = completion.usage {
            response = response.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }
        response
    }
}

/// Look for a `retry_after` seconds field in an error body
fn parse_retry_after(body: &str) -> Option<Duration> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_f64())
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl TaskExecutor<ChatRequest, ChatResponse> for ChatTask {
    async fn execute(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        tracing::debug!(
            backend = %self.name,
            url = %self.completion_url(),
            prompt_len = request.prompt.len(),
            "Sending chat completion"
        );
        Ok(self.send(&request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Recovery;

    #[test]
    fn test_builder() {
        let backend = ChatTask::new("openai", "https://api.openai.com/v1")
            .with_api_key("sk-test")
            .with_model("gpt-4o")
            .with_timeout(Duration::from_secs(60));

        assert_eq!(backend.name, "openai");
        assert_eq!(backend.api_key.as_deref(), Some("sk-test"));
        assert_eq!(backend.model.as_deref(), Some("gpt-4o"));
        assert_eq!(backend.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_completion_url() {
        let backend = ChatTask::new("test", "https://api.example.com/v1");
        assert_eq!(
            backend.completion_url(),
            "https://api.example.com/v1/chat/completions"
        );

        let backend = ChatTask::new("test", "https://api.example.com/v1/");
        assert_eq!(
            backend.completion_url(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_map_status() {
        let backend = ChatTask::new("test", "https://example.com");

        let err = backend.map_status(reqwest::StatusCode::UNAUTHORIZED, "bad token");
        assert_eq!(err.recovery(), Recovery::GiveUp);
        assert_eq!(err.to_string(), "HTTP 401: bad token");

        let err = backend.map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, r#"{"retry_after": 2}"#);
        assert_eq!(err.recovery(), Recovery::WaitFor(Duration::from_secs(2)));

        let err = backend.map_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, r#"{"retry_after": 2}"#);
        assert_eq!(err.recovery(), Recovery::Backoff);
    }

    #[test]
    fn test_to_response() {
        let completion: CompletionResponse = serde_json::from_value(serde_json::json!({
            "model": "qwen3",
            "choices": [{"message": {"content": "```json\n{\"ok\": true}\n```"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        }))
        .unwrap();

        let backend = ChatTask::new("local", "http://localhost:11434/v1");
        let response = backend.to_response(completion, Duration::from_millis(20));

        assert_eq!(response.model.as_deref(), Some("qwen3"));
        assert_eq!(response.structured.unwrap()["ok"], true);
        assert_eq!(response.usage.unwrap().total_tokens, Some(8));
    }

    #[test]
    fn test_from_settings() {
        let settings = BackendSettings {
            command: "http://localhost:11434/v1".into(),
            model: Some("qwen3-coder".into()),
            api_key_env: Some("LLM_FLOW_TEST_KEY_THAT_IS_NOT_SET".into()),
            timeout: 120,
            ..Default::default()
        };

        let backend = ChatTask::from_settings("ollama", &settings);
        assert_eq!(backend.base_url, "http://localhost:11434/v1");
        assert_eq!(backend.model.as_deref(), Some("qwen3-coder"));
        assert!(backend.api_key.is_none());
        assert_eq!(backend.timeout, Duration::from_secs(120));
    }
}
