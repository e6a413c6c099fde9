//! Tracing setup for the llm-flow binary

use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for the requested verbosity. `RUST_LOG` wins when set.
fn filter(debug: bool, quiet: bool) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }
    let level = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    EnvFilter::new(format!("llm_flow={}", level))
}

/// Initialize logging: stderr always, plus an append-mode file when requested
pub fn init_logging(debug: bool, quiet: bool, log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(file)
                    .with_target(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(debug, quiet))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Default log file for a workflow run: ~/.config/llm-flow/logs/<workflow>-<timestamp>.log
pub fn default_log_path(workflow_name: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("llm-flow")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let safe_name: String = workflow_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    Ok(log_dir.join(format!("{}-{}.log", safe_name, timestamp)))
}

/// Log file for this invocation: an explicit path wins, otherwise
/// `use_default` picks [`default_log_path`] for `workflow_name`
pub fn resolve_log_file(
    explicit: Option<PathBuf>,
    use_default: bool,
    workflow_name: &str,
) -> anyhow::Result<Option<PathBuf>> {
    match explicit {
        Some(path) => Ok(Some(path)),
        None if use_default => default_log_path(workflow_name).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_path() {
        let Ok(path) = default_log_path("code review") else {
            // No config dir in this environment
            return;
        };
        let file = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file.starts_with("code_review-"));
        assert!(file.ends_with(".log"));
        assert!(path.parent().unwrap().ends_with("llm-flow/logs"));
    }

    #[test]
    fn test_resolve_log_file() {
        let explicit = PathBuf::from("/tmp/flow.log");
        assert_eq!(
            resolve_log_file(Some(explicit.clone()), true, "run").unwrap(),
            Some(explicit)
        );
        assert_eq!(resolve_log_file(None, false, "run").unwrap(), None);

        if let Ok(Some(path)) = resolve_log_file(None, true, "ask") {
            let file = path.file_name().unwrap().to_string_lossy().to_string();
            assert!(file.starts_with("ask-"));
        }
    }
}
