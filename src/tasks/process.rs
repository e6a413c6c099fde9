//! Executors backed by local processes

use super::TaskExecutor;
use super::output_parser::extract_json;
use super::types::{ChatRequest, ChatResponse, TaskFailure};
use crate::config::BackendSettings;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Spawn a prepared command and collect stdout, failing on non-zero exit
async fn run_process(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> Result<String, TaskFailure> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let child = cmd
        .spawn()
        .map_err(|e| TaskFailure::Launch {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    tracing::debug!(program, pid = ?child.id(), "Spawned process");

    // Dropping the wait future on timeout kills the child
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(TaskFailure::Launch {
                program: program.to_string(),
                reason: format!("lost track of the child: {}", e),
            });
        }
        Err(_) => {
            tracing::warn!(program, ?timeout, "Process timed out");
            return Err(TaskFailure::Deadline { limit: timeout });
        }
    };

    if !output.status.success() {
        return Err(TaskFailure::Exit {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    tracing::debug!(program, elapsed = ?start.elapsed(), "Process finished");
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs its input as a `sh -c` command line and returns trimmed stdout
#[derive(Debug, Clone)]
pub struct ShellTask {
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl Default for ShellTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellTask {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Run commands from this directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TaskExecutor<String, String> for ShellTask {
    async fn execute(&self, command: String) -> anyhow::Result<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        Ok(run_process(cmd, "sh", self.timeout).await?)
    }
}

/// Executor for CLI-based LLM programs; the prompt goes last on the command line
#[derive(Debug, Clone)]
pub struct CommandTask {
    name: String,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl CommandTask {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from a `[backends.<name>]` settings entry
    pub fn from_settings(name: impl Into<String>, settings: &BackendSettings) -> Self {
        let mut env: Vec<_> = settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.sort();

        Self {
            name: name.into(),
            program: settings.command.clone(),
            args: settings.args.clone(),
            env,
            timeout: Duration::from_secs(settings.timeout),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn prompt_argument(request: &ChatRequest) -> String {
        match request.system {
            Some(ref system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        }
    }
}

#[async_trait]
impl TaskExecutor<ChatRequest, ChatResponse> for CommandTask {
    async fn execute(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.arg(Self::prompt_argument(&request));

        tracing::debug!(
            backend = %self.name,
            program = %self.program,
            prompt_len = request.prompt.len(),
            "Running command backend"
        );

        let timeout = request.timeout.unwrap_or(self.timeout);
        let text = run_process(cmd, &self.program, timeout).await?;

        let mut response = ChatResponse::new(text, self.name.clone(), start.elapsed());
        if let Some(json) = extract_json(&response.text) {
            response = response.with_structured(json);
        }
        Ok(response)
    }
}
