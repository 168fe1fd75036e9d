//! `fabric` -- run tasks against specialist packs from the command line.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fabric",
    version,
    about = "taskfabric: on-demand specialist packs over a local-first tool loop"
)]
struct Cli {
    /// Enable verbose (DEBUG) logging to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task end-to-end and print the result and run directory.
    Run(commands::run::RunArgs),

    /// Run the HTTP API.
    Serve(commands::serve::ServeArgs),

    /// Inspect past runs.
    Logs {
        #[command(subcommand)]
        command: commands::logs::LogsCommand,
    },
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => commands::run::run(args).await,
        Command::Serve(args) => commands::serve::serve(args).await,
        Command::Logs { command } => commands::logs::logs(command),
    }
}
