// Remote Sync
// Command-line front end: status preview, push and pull

// IMPORTS ------------------>>

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dialoguer::MultiSelect;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use remote_sync::core::{AppConfig, CycleReport, Preview, ProjectConfig, SyncSession};
use remote_sync::logging;
use remote_sync::operations::{
    Action, CancelSignal, ChangeKind, ChangeSet, CliRemote, ConfirmationGate, ExecutionReport,
    Outcome, PreApproved, SyncDirection, SyncPlan,
};
use remote_sync::utilities::normalize_relative;

//--------------------------------------------------------<<
// CLI ---------------------->>

/// Keep a local directory and a remote folder in sync
#[derive(Parser, Debug)]
#[command(name = "remote-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the nearest remote-sync.yaml)
    #[arg(short, long, global = true, env = "REMOTE_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Local directory, overriding the config file
    #[arg(long, global = true)]
    local: Option<PathBuf>,

    /// Remote folder, overriding the config file
    #[arg(long, global = true)]
    remote: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what a sync would change without touching anything
    Status {
        /// push (local-to-remote) or pull (remote-to-local)
        #[arg(short, long)]
        direction: Option<SyncDirection>,
    },

    /// Make the remote folder match the local directory
    Push(SyncArgs),

    /// Make the local directory match the remote folder
    Pull(SyncArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Approve deleting this path on the destination (repeatable)
    #[arg(long = "delete", value_name = "PATH")]
    delete: Vec<String>,

    /// Pick deletions to approve interactively
    #[arg(short, long)]
    interactive: bool,

    /// Check every action without modifying anything
    #[arg(long)]
    dry_run: bool,
}

//--------------------------------------------------------<<

// ┌──────────────────────────────────────────────────────────────────────────────────────────────────┐
// │                                        MAIN ENTRY POINT                                          │
// └──────────────────────────────────────────────────────────────────────────────────────────────────┘

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the command completed without failures
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}: logging disabled: {}", "warning".yellow(), e);
    }

    let app = AppConfig::default();
    let mut project = load_project(&cli)?;
    if let Some(local) = &cli.local {
        project.local_root = Some(local.clone());
    }
    if let Some(remote) = &cli.remote {
        project.remote_root = Some(remote.clone());
    }

    let mut options = project.executor_options(&app);
    options.dry_run = matches!(&cli.command, Command::Push(args) | Command::Pull(args) if args.dry_run);

    let store = Arc::new(CliRemote::new(project.remote_commands(&app)));
    let session = SyncSession::from_config(&project, &app, store)
        .context("Incomplete configuration (set local_root/remote_root or pass --local/--remote)")?
        .with_executor_options(options);

    match cli.command {
        Command::Status { direction } => {
            let direction = direction.unwrap_or_else(|| project.direction(&app));
            let preview = session.preview(direction).await?;
            print_preview(&preview);
            Ok(true)
        }
        Command::Push(args) => sync(session, SyncDirection::LocalToRemote, args).await,
        Command::Pull(args) => sync(session, SyncDirection::RemoteToLocal, args).await,
    }
}

fn load_project(cli: &Cli) -> Result<ProjectConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    match ProjectConfig::locate(cli.config.as_deref(), &cwd) {
        Some(path) => {
            tracing::debug!(config = %path.display(), "loading project config");
            ProjectConfig::load(&path)
        }
        None => Ok(ProjectConfig::default()),
    }
}

async fn sync(session: SyncSession, direction: SyncDirection, args: SyncArgs) -> Result<bool> {
    let mut delete = Vec::with_capacity(args.delete.len());
    for path in &args.delete {
        let normalized = normalize_relative(path)
            .with_context(|| format!("Invalid --delete path: {}", path))?;
        delete.push(normalized);
    }

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "interrupted, stopping sync".yellow());
            on_interrupt.cancel();
        }
    });

    let report = if args.interactive {
        session.run_cycle(direction, &InteractiveGate { preselected: delete }, &cancel).await?
    } else {
        session.run_cycle(direction, &PreApproved::new(delete), &cancel).await?
    };

    print_report(&report);
    Ok(report.is_success())
}

//--------------------------------------------------------<<
// CONFIRMATION ------------->>

/// Asks on the terminal which deletions may go ahead
struct InteractiveGate {
    preselected: Vec<String>,
}

impl ConfirmationGate for InteractiveGate {
    fn approve(&self, pending: &[String]) -> BTreeSet<String> {
        let defaults: Vec<bool> = pending.iter().map(|p| self.preselected.contains(p)).collect();
        let picked = MultiSelect::new()
            .with_prompt("Approve deletions (space to toggle, enter to confirm)")
            .items(pending)
            .defaults(&defaults)
            .interact();

        match picked {
            Ok(indices) => indices.into_iter().map(|i| pending[i].clone()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "confirmation prompt failed, approving nothing");
                BTreeSet::new()
            }
        }
    }
}

//--------------------------------------------------------<<
// OUTPUT ------------------->>

fn print_preview(preview: &Preview) {
    println!(
        "{} {} ({} local, {} remote entries)",
        "status".cyan().bold(),
        preview.direction,
        preview.local.len(),
        preview.remote.len()
    );
    for snapshot in [&preview.local, &preview.remote] {
        for warning in snapshot.warnings() {
            println!("  {} {}: {}", "warn".yellow(), snapshot.side(), warning);
        }
    }
    print_changes(&preview.changes);
    print_plan(&preview.plan);
}

fn print_changes(changes: &ChangeSet) {
    let summary = changes.summary();
    println!(
        "{} new, {} modified, {} deleted, {} unchanged",
        summary.new.to_string().green(),
        summary.modified.to_string().yellow(),
        summary.deleted.to_string().red(),
        summary.unchanged
    );
    for change in changes.iter() {
        let tag = match change.kind {
            ChangeKind::New => "new".green(),
            ChangeKind::Modified if change.is_replacement() => "replace".magenta(),
            ChangeKind::Modified => "modified".yellow(),
            ChangeKind::Deleted => "deleted".red(),
            ChangeKind::Unchanged => continue,
        };
        println!("  {:>8} {}", tag, change.path);
    }
}

fn print_plan(plan: &SyncPlan) {
    if plan.is_empty() && !plan.has_pending() {
        println!("{}", "nothing to do".green());
        return;
    }
    println!("{} {} action(s)", "plan".cyan().bold(), plan.len());
    for action in plan.iter() {
        println!("  {} {}", action_tag(action), action.path());
    }
    for path in &plan.pending {
        println!("  {} {} (deletion not approved)", "pending".yellow(), path);
    }
    for path in &plan.deferred {
        println!("  {} {} (waits on a pending replacement)", "deferred".yellow(), path);
    }
}

fn print_report(report: &CycleReport) {
    if report.partial {
        println!("{}", "scan was partial; some entries were skipped".yellow());
    }
    print_results(&report.execution);
    for path in &report.plan.pending {
        println!("  {} {} (deletion not approved)", "pending".yellow(), path);
    }
    for path in &report.plan.deferred {
        println!("  {} {} (waits on a pending replacement)", "deferred".yellow(), path);
    }
}

fn print_results(execution: &ExecutionReport) {
    for result in &execution.results {
        let tag = match &result.outcome {
            Outcome::Success => "ok".green(),
            Outcome::Skipped(_) => "skip".yellow(),
            Outcome::Failed(_) => "fail".red().bold(),
        };
        match &result.outcome {
            Outcome::Success => println!("  {:>4} {}", tag, result.action),
            Outcome::Skipped(reason) | Outcome::Failed(reason) => {
                println!("  {:>4} {} ({})", tag, result.action, reason)
            }
        }
    }
    if execution.cancelled {
        println!("{}", "cancelled before the plan finished".yellow());
    }
    println!(
        "{} succeeded, {} skipped, {} failed",
        execution.succeeded().to_string().green(),
        execution.skipped().to_string().yellow(),
        execution.failed().to_string().red()
    );
}

fn action_tag(action: &Action) -> colored::ColoredString {
    let label = action.label();
    if action.is_destructive() {
        label.red()
    } else if action.is_dir_creation() {
        label.blue()
    } else {
        label.green()
    }
}
