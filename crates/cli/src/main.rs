use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ct_core::configs::settings::Config;
use ct_core::execution::TaskRunner;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Environment variable holding the log filter
const LOG_ENV: &str = "CT_LOG";
/// Log level when `CT_LOG` is unset
const DEFAULT_LOG_LEVEL: &str = "warn";

/// ct - A multi-command security toolkit
#[derive(Parser)]
#[command(name = "ct")]
#[command(about = "Run scanning, DNS, OSINT and recon scripts with uniform results")]
#[command(version)]
struct Cli {
    /// Path to the settings file (defaults to $CT_CONFIG, then configs/default.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scanning tasks (nmap, http checks)
    Scan(TaskArgs),
    /// Run DNS lookups and record gathering
    Dns(TaskArgs),
    /// Run OSINT tasks and data enrichment
    Osint(TaskArgs),
    /// Run recon tasks (subdomain discovery, crawl)
    Recon(TaskArgs),
    /// Run any task by name, including ones from the settings file
    Run {
        /// Task name
        task: String,
        #[command(flatten)]
        args: TaskArgs,
    },
    /// Run a task against several targets concurrently
    Batch {
        /// Task name
        task: String,
        /// Targets, one job each
        #[arg(required = true)]
        targets: Vec<String>,
        /// Number of concurrent jobs (defaults to the settings file)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
        /// Print result records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check, and offer to install, the tools a task needs
    Deps {
        /// Task name
        task: String,
    },
    /// List available tasks
    Tasks,
    /// Inspect settings
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Target followed by arguments passed through to the script; `--json`
    /// anywhere switches to JSON output
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings
    Show,
    /// Print the JSON schema of the settings file
    Schema,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// Text printed for a failed command: the error chain, no prefix
fn failure_message(error: &anyhow::Error) -> String {
    format!("{:#}", error)
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config load failed: {}", e))?;
    let runner = TaskRunner::new(config);

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::Scan(args) => commands::run::execute(&runner, "scan", args.args).await,
        Commands::Dns(args) => commands::run::execute(&runner, "dns", args.args).await,
        Commands::Osint(args) => commands::run::execute(&runner, "osint", args.args).await,
        Commands::Recon(args) => commands::run::execute(&runner, "recon", args.args).await,
        Commands::Run { task, args } => commands::run::execute(&runner, &task, args.args).await,
        Commands::Batch {
            task,
            targets,
            concurrency,
            json,
        } => commands::batch::execute(&runner, &task, targets, concurrency, json).await,
        Commands::Deps { task } => commands::deps::execute(&runner, &task).await,
        Commands::Tasks => commands::list::execute(&runner),
        Commands::Config { config_command } => commands::config::execute(&runner, config_command),
    }
}
