mod batch;
mod config;
mod execute;
mod ledger;
mod plan;
mod queue;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Job export format for `remedy queue --export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExportArg {
    Json,
    Script,
    Csv,
}

impl From<ExportArg> for remedy_engine::ExportFormat {
    fn from(arg: ExportArg) -> Self {
        match arg {
            ExportArg::Json => remedy_engine::ExportFormat::Json,
            ExportArg::Script => remedy_engine::ExportFormat::Script,
            ExportArg::Csv => remedy_engine::ExportFormat::Csv,
        }
    }
}

/// Idempotent remediation pipeline for integration records.
#[derive(Parser)]
#[command(
    name = "remedy",
    version,
    about = "Idempotent remediation pipeline for integration records"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to the TOML config file (default: ./remedy.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). REMEDY_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an execution plan from an action batch without running it
    Plan {
        /// Path to the action batch JSON file
        batch: PathBuf,
    },

    /// Plan and execute an action batch, consulting and updating the ledger
    Execute {
        /// Path to the action batch JSON file
        batch: PathBuf,
        /// Simulate: no downstream calls, ledger left untouched
        #[arg(long)]
        dry_run: bool,
        /// Confirm high and critical risk plans
        #[arg(long)]
        yes: bool,
        /// Allow Delete actions
        #[arg(long)]
        allow_destructive: bool,
        /// Execute even if the ledger says the entity is already processed
        #[arg(long)]
        force: bool,
        /// Operator recorded in the ledger
        #[arg(long, default_value = "cli")]
        operator: String,
    },

    /// Queue action batches as jobs and run them with bounded concurrency
    Queue {
        /// Paths to action batch JSON files, one job each
        #[arg(required = true)]
        batches: Vec<PathBuf>,
        /// Simulate: no downstream calls
        #[arg(long)]
        dry_run: bool,
        /// Export the jobs instead of running them
        #[arg(long, value_enum)]
        export: Option<ExportArg>,
        /// Operator recorded on each job
        #[arg(long, default_value = "cli")]
        operator: String,
        /// Environment label recorded on each job
        #[arg(long, default_value = "production")]
        environment: String,
    },

    /// Inspect and maintain the processing ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum LedgerCommands {
    /// Report whether a batch's entity is already processed for its issues
    Check {
        /// Path to the action batch JSON file
        batch: PathBuf,
    },
    /// Summarize ledger rows
    Stats {
        /// Only rows processed within the last N hours
        #[arg(long)]
        since_hours: Option<i64>,
    },
    /// List entities due for reprocessing (old or failed)
    Stale {
        /// Age threshold in hours (default: ledger.max_age_hours)
        #[arg(long)]
        max_age_hours: Option<i64>,
    },
    /// Delete old Detected and Remediated rows
    Cleanup {
        /// Age threshold in hours
        #[arg(long, default_value = "720")]
        older_than_hours: i64,
    },
    /// Write a ledger snapshot as JSON
    Export {
        /// Destination file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upsert every record from a ledger snapshot
    Import {
        /// Path to the snapshot JSON file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, cli.output, cli.quiet);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Plan { batch } => {
            plan::cmd_plan(&batch, &config, cli.output, cli.quiet);
        }
        Commands::Execute {
            batch,
            dry_run,
            yes,
            allow_destructive,
            force,
            operator,
        } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(execute::cmd_execute(
                execute::ExecuteArgs {
                    batch: &batch,
                    dry_run,
                    yes,
                    allow_destructive,
                    force,
                    operator: &operator,
                },
                &config,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Queue {
            batches,
            dry_run,
            export,
            operator,
            environment,
        } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(queue::cmd_queue(
                queue::QueueArgs {
                    batches: &batches,
                    dry_run,
                    export: export.map(Into::into),
                    operator: &operator,
                    environment: &environment,
                },
                &config,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Ledger { command } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(ledger::cmd_ledger(command, &config, cli.output, cli.quiet));
        }
    }
}

/// Install the stderr log subscriber. `REMEDY_LOG` takes precedence over
/// `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("REMEDY_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to start tokio runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    }
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", json);
}

/// Report an error to stderr in the chosen output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
