//! CLI module for llm-flow
//!
//! This module provides:
//! - Command implementations (run, ask, config)
//! - Output handlers (console, JSON, quiet) fed by workflow lifecycle hooks
//!
//! # Example
//!
//! ```ignore
//! use llm_flow::cli::{self, OutputMode};
//!
//! let handler = cli::create_handler(OutputMode::Console);
//! let steps = cli::parse_steps(&["greet=echo hi".to_string()])?;
//! let exit_code = cli::run_steps(steps, false, dir, None, false, handler).await?;
//! ```

pub mod commands;
pub mod output;

pub use commands::{ShellStep, ask, parse_steps, run_steps, shell_workflow, show_config};
pub use output::{OutputEvent, OutputHandler, OutputMode, attach, create_handler};
