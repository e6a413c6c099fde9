//! CLI command implementations

use super::output::{OutputEvent, OutputHandler, attach};
use crate::config::{BackendSettings, Settings, WorkflowConfig};
use crate::tasks::{ChatRequest, RetryPolicy, ShellTask, executor_for, with_retry};
use crate::workflow::{
    ExecutionContext, FlowError, ParallelTask, RunOptions, Workflow, create_workflow,
};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One step of an ad-hoc shell workflow
#[derive(Debug, Clone, PartialEq)]
pub struct ShellStep {
    pub name: String,
    pub command: String,
}

/// Parse `name=command` arguments. Arguments without a name become `step<N>`.
pub fn parse_steps(args: &[String]) -> Result<Vec<ShellStep>> {
    if args.is_empty() {
        bail!("at least one step is required");
    }

    args.iter()
        .enumerate()
        .map(|(i, arg)| match arg.split_once('=') {
            Some((name, command)) if is_step_name(name) => {
                if command.trim().is_empty() {
                    bail!("step '{}' has an empty command", name);
                }
                Ok(ShellStep {
                    name: name.to_string(),
                    command: command.to_string(),
                })
            }
            _ => Ok(ShellStep {
                name: format!("step{}", i + 1),
                command: arg.clone(),
            }),
        })
        .collect()
}

fn is_step_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Build a workflow that runs shell steps in order, or all at once as one parallel group.
/// Its output is the final result map.
pub fn shell_workflow(
    config: WorkflowConfig,
    steps: Vec<ShellStep>,
    parallel: bool,
    shell: ShellTask,
) -> Result<Workflow<(), Value>, FlowError> {
    let steps = Arc::new(steps);

    create_workflow(config, move |w: ExecutionContext<()>| {
        let steps = steps.clone();
        let shell = shell.clone();
        async move {
            if parallel {
                let group = steps
                    .iter()
                    .map(|step| ParallelTask::new(step.name.clone(), shell.clone(), step.command.clone()))
                    .collect();
                w.parallel(group).await?;
            } else {
                for step in steps.iter() {
                    w.task(step.name.clone(), shell.clone(), step.command.clone())
                        .await?;
                }
            }
            w.success(w.results().to_json())
        }
    })
}

/// Run shell steps and print the collected results
pub async fn run_steps(
    steps: Vec<ShellStep>,
    parallel: bool,
    working_dir: &Path,
    timeout: Option<Duration>,
    cancel_siblings: bool,
    handler: Arc<dyn OutputHandler>,
) -> Result<i32> {
    let config = WorkflowConfig::new("run")
        .with_description(format!("{} shell step(s)", steps.len()))
        .cancel_siblings_on_failure(cancel_siblings);
    let config = attach(config, handler.clone());

    let workflow = shell_workflow(config, steps, parallel, ShellTask::new().in_dir(working_dir))?;

    let mut options = RunOptions::new();
    if let Some(limit) = timeout {
        options = options.with_timeout(limit);
    }

    // Failures already reached the handler through on_error
    match workflow.run_with((), options).await {
        Ok(output) => {
            handler.result(true, &output);
            Ok(0)
        }
        Err(_) => {
            handler.result(false, &Value::Null);
            Ok(1)
        }
    }
}

/// Resolve backend names to settings; an empty list means every enabled backend
fn select_backends(settings: &Settings, names: &[String]) -> Result<Vec<(String, BackendSettings)>> {
    let selected: Vec<_> = if names.is_empty() {
        settings
            .enabled_backends()
            .into_iter()
            .map(|(name, backend)| (name.to_string(), backend.clone()))
            .collect()
    } else {
        names
            .iter()
            .map(|name| {
                settings
                    .backends
                    .get(name)
                    .map(|backend| (name.clone(), backend.clone()))
                    .with_context(|| format!("unknown backend '{}'", name))
            })
            .collect::<Result<_>>()?
    };

    if selected.is_empty() {
        bail!("no backends configured; add a [backends.<name>] section to .llm-flow/config.toml");
    }
    Ok(selected)
}

/// Send one prompt to several backends concurrently and print each reply
pub async fn ask(
    prompt: &str,
    system: Option<&str>,
    backend_names: &[String],
    settings: &Settings,
    handler: Arc<dyn OutputHandler>,
) -> Result<i32> {
    let policy = RetryPolicy::from_settings(&settings.retry);
    let members: Vec<_> = select_backends(settings, backend_names)?
        .into_iter()
        .map(|(name, backend)| {
            let executor = with_retry(executor_for(&name, &backend), policy.clone());
            (name, executor)
        })
        .collect();
    let members = Arc::new(members);

    let mut request = ChatRequest::new(prompt);
    if let Some(system) = system {
        request = request.with_system(system);
    }

    let config = WorkflowConfig::new("ask")
        .with_description("fan a prompt out to LLM backends")
        .cancel_siblings_on_failure(settings.defaults.cancel_siblings);
    let config = attach(config, handler.clone());

    let workflow = create_workflow(config, move |w: ExecutionContext<ChatRequest>| {
        let members = members.clone();
        async move {
            let group = members
                .iter()
                .map(|(name, executor)| ParallelTask::new(name.clone(), executor.clone(), w.input().clone()))
                .collect();
            let replies = w.parallel(group).await?;

            let texts: Map<String, Value> = members
                .iter()
                .zip(replies)
                .map(|((name, _), reply)| {
                    let text = reply.get("text").cloned().unwrap_or(reply);
                    (name.clone(), text)
                })
                .collect();
            w.success(Value::Object(texts))
        }
    })?;

    let mut options = RunOptions::new();
    if let Some(secs) = settings.defaults.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    match workflow.run_with(request, options).await {
        Ok(output) => {
            handler.result(true, &output);
            Ok(0)
        }
        Err(_) => {
            handler.result(false, &Value::Null);
            Ok(1)
        }
    }
}

/// Print the resolved settings
pub fn show_config(settings: &Settings, handler: &dyn OutputHandler) -> Result<i32> {
    if let Some(path) = Settings::user_config_path() {
        handler.emit(OutputEvent::Info {
            message: format!("user config: {}", path.display()),
        });
    }

    let enabled: Vec<_> = settings.enabled_backends().into_iter().map(|(name, _)| name).collect();
    handler.emit(OutputEvent::Info {
        message: if enabled.is_empty() {
            "enabled backends: (none)".to_string()
        } else {
            format!("enabled backends: {}", enabled.join(", "))
        },
    });

    let rendered = serde_json::to_value(settings).context("rendering settings")?;
    handler.result(true, &rendered);
    Ok(0)
}
