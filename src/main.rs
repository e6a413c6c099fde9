use anyhow::Result;
use clap::{Parser, Subcommand};
use llm_flow::cli::{self, OutputMode};
use llm_flow::config::Settings;
use llm_flow::logging;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "llm-flow")]
#[command(about = "Compose LLM and shell tasks into workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    /// Emit events and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Also write logs under ~/.config/llm-flow/logs/
    #[arg(long, global = true, conflicts_with = "log_file")]
    log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run shell steps given as name=command
    Run {
        /// Steps, e.g. build="cargo build" test="cargo test"
        #[arg(required = true)]
        steps: Vec<String>,

        /// Run all steps concurrently
        #[arg(long)]
        parallel: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Send a prompt to one or more configured backends
    Ask {
        /// Prompt text
        prompt: String,

        /// Backend to query (repeatable; defaults to all enabled)
        #[arg(long = "backend")]
        backends: Vec<String>,

        /// System prompt
        #[arg(long)]
        system: Option<String>,
    },

    /// Show resolved configuration
    Config,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Run { .. } => "run",
            Commands::Ask { .. } => "ask",
            Commands::Config => "config",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = logging::resolve_log_file(cli.log_file.clone(), cli.log, cli.command.name())?;
    logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let project_dir = cli.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let settings = Settings::load(Some(&project_dir))?;
    let handler = cli::create_handler(OutputMode::from_flags(cli.json, cli.quiet));

    let exit_code = match cli.command {
        Commands::Run {
            steps,
            parallel,
            timeout,
        } => {
            let steps = cli::parse_steps(&steps)?;
            let timeout = timeout
                .or(settings.defaults.timeout)
                .map(Duration::from_secs);
            cli::run_steps(
                steps,
                parallel,
                &project_dir,
                timeout,
                settings.defaults.cancel_siblings,
                handler,
            )
            .await?
        }

        Commands::Ask {
            prompt,
            backends,
            system,
        } => cli::ask(&prompt, system.as_deref(), &backends, &settings, handler).await?,

        Commands::Config => cli::show_config(&settings, handler.as_ref())?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
