//! `warden status` — daemon lease and live workers per script.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use warden_core::registry;
use warden_daemon::paths::pid_file_path;
use warden_daemon::{lease, LeaseStatus, Supervisor, WorkerProcess};

use super::load_config;

/// Arguments for `warden status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone)]
struct ScriptStatus {
    name: String,
    title: String,
    target: String,
    workers: Vec<WorkerProcess>,
}

#[derive(Serialize)]
struct StatusReportJson {
    daemon: LeaseStatus,
    scripts: Vec<ScriptStatusJson>,
}

#[derive(Serialize)]
struct ScriptStatusJson {
    name: String,
    title: String,
    target: String,
    workers: Vec<WorkerJson>,
}

#[derive(Serialize)]
struct WorkerJson {
    pid: u32,
    started_at: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "script")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "pids")]
    pids: String,
    #[tabled(rename = "started")]
    started: String,
    #[tabled(rename = "target")]
    target: String,
}

impl StatusArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let daemon = lease::inspect(&pid_file_path(home)).context("failed to read daemon lease")?;
        let scripts = collect_scripts(home)?;

        if self.json {
            return print_json(daemon, scripts);
        }
        print_table(&daemon, scripts);
        Ok(())
    }
}

fn collect_scripts(home: &Path) -> Result<Vec<ScriptStatus>> {
    let supervisor = Supervisor::new(load_config(home)?);
    let entries = registry::list_at(home).context("failed to read script store")?;

    Ok(entries
        .into_iter()
        .map(|entry| ScriptStatus {
            title: supervisor.title(&entry.name).to_string(),
            workers: supervisor.workers(&entry.name),
            name: entry.name.to_string(),
            target: entry.target_path.display().to_string(),
        })
        .collect())
}

fn print_json(daemon: LeaseStatus, scripts: Vec<ScriptStatus>) -> Result<()> {
    let payload = StatusReportJson {
        daemon,
        scripts: scripts
            .into_iter()
            .map(|script| ScriptStatusJson {
                name: script.name,
                title: script.title,
                target: script.target,
                workers: script
                    .workers
                    .iter()
                    .map(|worker| WorkerJson {
                        pid: worker.pid,
                        started_at: started_at(worker).map(|at| at.to_rfc3339()),
                    })
                    .collect(),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(daemon: &LeaseStatus, scripts: Vec<ScriptStatus>) {
    let daemon_line = match (daemon.pid, daemon.alive) {
        (Some(pid), true) => format!("running (pid {pid})").green().bold().to_string(),
        (Some(pid), false) => format!("stopped (stale pid {pid})").yellow().to_string(),
        (None, _) => "stopped".bright_black().to_string(),
    };
    println!(
        "Warden v{} | daemon {} | {} scripts",
        env!("CARGO_PKG_VERSION"),
        daemon_line,
        scripts.len(),
    );

    if scripts.is_empty() {
        println!("No monitoring scripts found. Add your first one.");
        return;
    }

    let rows: Vec<StatusTableRow> = scripts
        .into_iter()
        .map(|script| {
            let state = match script.workers.len() {
                0 => "STOPPED",
                1 => "RUNNING",
                _ => "DUPLICATE",
            };
            StatusTableRow {
                name: script.name,
                state: state.to_string(),
                pids: join_or_dash(script.workers.iter().map(|w| w.pid.to_string())),
                started: join_or_dash(script.workers.iter().filter_map(|w| {
                    started_at(w).map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                })),
                target: script.target,
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn started_at(worker: &WorkerProcess) -> Option<DateTime<Local>> {
    let secs = i64::try_from(worker.started_at_unix).ok()?;
    DateTime::from_timestamp(secs, 0).map(|at| at.with_timezone(&Local))
}

fn join_or_dash(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}
