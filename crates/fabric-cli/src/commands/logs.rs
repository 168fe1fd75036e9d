//! `fabric logs` -- list and inspect past runs.

use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use fabric_core::workspace::reader;

use super::workspace_root;

#[derive(Subcommand)]
pub enum LogsCommand {
    /// List recent runs, most recent first.
    List {
        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Dump all events of one run as JSON lines.
    Show {
        /// The run id (see `fabric logs list`).
        run_id: String,
    },
}

pub fn logs(command: LogsCommand) -> anyhow::Result<()> {
    match command {
        LogsCommand::List { limit } => list(limit),
        LogsCommand::Show { run_id } => show(&run_id),
    }
}

fn list(limit: usize) -> anyhow::Result<()> {
    let runs = reader::list_runs(&workspace_root(), limit);
    if runs.is_empty() {
        println!("No runs found in {}", workspace_root().display());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Run", "Specialist", "Routing", "Events", "Summary"]);
    for run in runs {
        table.add_row(vec![
            run.run_id,
            run.specialist_id.unwrap_or_else(|| "-".into()),
            run.routing_method.unwrap_or_else(|| "-".into()),
            run.event_count.to_string(),
            run.payload_summary
                .map(|s| s.chars().take(60).collect())
                .unwrap_or_else(|| "-".into()),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn show(run_id: &str) -> anyhow::Result<()> {
    let events = reader::read_run_events(run_id, &workspace_root())?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
