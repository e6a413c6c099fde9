//! Output handlers for CLI commands
//!
//! Workflow lifecycle hooks are turned into [`OutputEvent`]s and rendered
//! in console (pretty), JSON, or quiet mode.

use crate::config::WorkflowConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Pick the mode from the global flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// Events emitted during a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    WorkflowStart { name: String, input: Value },
    TaskStart { name: String },
    TaskComplete { name: String, result: Value },
    WorkflowComplete { name: String, output: Value },
    WorkflowError { error: String },
    Info { message: String },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write the final result
    fn result(&self, success: bool, output: &Value);
}

/// Route a workflow's lifecycle hooks to an output handler
pub fn attach(config: WorkflowConfig, handler: Arc<dyn OutputHandler>) -> WorkflowConfig {
    let (on_start, on_task, on_done, on_complete, on_error) = (
        handler.clone(),
        handler.clone(),
        handler.clone(),
        handler.clone(),
        handler,
    );

    config
        .on_workflow_start(move |name, input| {
            on_start.emit(OutputEvent::WorkflowStart {
                name: name.to_string(),
                input: input.clone(),
            })
        })
        .on_task_start(move |name| on_task.emit(OutputEvent::TaskStart { name: name.to_string() }))
        .on_task_complete(move |name, result| {
            on_done.emit(OutputEvent::TaskComplete {
                name: name.to_string(),
                result: result.clone(),
            })
        })
        .on_workflow_complete(move |name, output| {
            on_complete.emit(OutputEvent::WorkflowComplete {
                name: name.to_string(),
                output: output.clone(),
            })
        })
        .on_error(move |err| on_error.emit(OutputEvent::WorkflowError { error: err.to_string() }))
}

/// Console output handler
pub struct ConsoleHandler;

impl ConsoleHandler {
    /// One-line preview of a JSON value
    fn preview(value: &Value) -> String {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let first_line = text.lines().next().unwrap_or_default();
        if first_line.chars().count() > 60 {
            let cut: String = first_line.chars().take(57).collect();
            format!("{}...", cut)
        } else {
            first_line.to_string()
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::WorkflowStart { name, .. } => {
                eprintln!("Running workflow '{}'", name);
            }
            OutputEvent::TaskStart { name } => {
                eprintln!("  ▸ {}", name);
            }
            OutputEvent::TaskComplete { name, result } => {
                eprintln!("  ✓ {}: {}", name, Self::preview(&result));
            }
            OutputEvent::WorkflowComplete { name, .. } => {
                eprintln!("✓ Workflow '{}' completed", name);
            }
            OutputEvent::WorkflowError { error } => {
                eprintln!("✗ {}", error);
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
        }
    }

    fn result(&self, _success: bool, output: &Value) {
        print_value(output);
    }
}

/// JSON output handler, one object per line
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }

    fn result(&self, success: bool, output: &Value) {
        #[derive(Serialize)]
        struct FinalResult<'a> {
            success: bool,
            output: &'a Value,
        }

        self.print_json(&FinalResult { success, output });
    }
}

/// Quiet handler: only the final result
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}

    fn result(&self, _success: bool, output: &Value) {
        print_value(output);
    }
}

fn print_value(output: &Value) {
    match output {
        Value::String(s) => println!("{}", s),
        Value::Null => {}
        other => match serde_json::to_string_pretty(other) {
            Ok(s) => println!("{}", s),
            Err(_) => println!("{}", other),
        },
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode) -> Arc<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Arc::new(ConsoleHandler),
        OutputMode::Json => Arc::new(JsonHandler::new(false)),
        OutputMode::Quiet => Arc::new(QuietHandler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ExecutionContext, create_workflow};
    use serde_json::json;
    use std::sync::Mutex;

    /// Mock handler for testing
    #[derive(Default)]
    struct MockHandler {
        events: Mutex<Vec<OutputEvent>>,
    }

    impl MockHandler {
        fn events(&self) -> Vec<OutputEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl OutputHandler for MockHandler {
        fn emit(&self, event: OutputEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn result(&self, _success: bool, _output: &Value) {}
    }

    #[test]
    fn test_output_mode_from_flags() {
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(false, true), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Console);
    }

    #[tokio::test]
    async fn test_attach_routes_lifecycle() {
        let handler = Arc::new(MockHandler::default());
        let config = attach(WorkflowConfig::new("greet"), handler.clone());

        let workflow = create_workflow(config, |w: ExecutionContext<String>| async move {
            let name = w.input().clone();
            let reply = w
                .task("hello", |n: String| async move { anyhow::Ok(format!("hi {n}")) }, name)
                .await?;
            w.success(reply)
        })
        .unwrap();
        workflow.run("ada".into()).await.unwrap();

        assert_eq!(
            handler.events(),
            vec![
                OutputEvent::WorkflowStart { name: "greet".into(), input: json!("ada") },
                OutputEvent::TaskStart { name: "hello".into() },
                OutputEvent::TaskComplete { name: "hello".into(), result: json!("hi ada") },
                OutputEvent::WorkflowComplete { name: "greet".into(), output: json!("hi ada") },
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_reports_error() {
        let handler = Arc::new(MockHandler::default());
        let config = attach(WorkflowConfig::new("broken"), handler.clone());

        let workflow = create_workflow(config, |w: ExecutionContext<()>| async move {
            w.fail::<()>("nope")
        })
        .unwrap();
        workflow.run(()).await.unwrap_err();

        let events = handler.events();
        assert_eq!(
            events.last(),
            Some(&OutputEvent::WorkflowError {
                error: "Workflow 'broken' failed: nope".into()
            })
        );
    }

    #[test]
    fn test_console_preview() {
        assert_eq!(ConsoleHandler::preview(&json!("line one\nline two")), "line one");
        assert_eq!(ConsoleHandler::preview(&json!(42)), "42");
        let long = "x".repeat(100);
        assert_eq!(ConsoleHandler::preview(&json!(long)).len(), 60);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = OutputEvent::TaskStart { name: "lint".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"type": "TaskStart", "name": "lint"}));
    }

    #[test]
    fn test_create_handler() {
        let _ = create_handler(OutputMode::Console);
        let _ = create_handler(OutputMode::Json);
        let _ = create_handler(OutputMode::Quiet);
    }
}
