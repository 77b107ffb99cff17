// Debug script to show how a local tree compares with a saved remote listing
// and which actions the planner would emit, without touching either side

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use remote_sync::core::{AppConfig, ProjectConfig};
use remote_sync::operations::remote::{parse_listing_output, RemoteListing};
use remote_sync::operations::{ChangeKind, RootSource, Snapshot, SyncDirection, SyncPlanner};

#[derive(Parser, Debug)]
#[command(name = "debug-diff")]
struct Args {
    /// Local directory to scan
    local: PathBuf,

    /// File holding the storage tool's JSON listing (full remote paths)
    listing: PathBuf,

    /// Remote root the listing was taken from
    #[arg(long, default_value = "/")]
    remote_root: String,

    /// push or pull
    #[arg(long, default_value = "push")]
    direction: SyncDirection,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let app = AppConfig::default();
    let project = ProjectConfig::default();
    let options = project.scan_options(&app);

    let text = fs::read_to_string(&args.listing)
        .with_context(|| format!("Failed to read listing: {}", args.listing.display()))?;
    let records = parse_listing_output(&args.remote_root, &text)?;
    let listing = RemoteListing {
        root: args.remote_root.clone(),
        records,
        warnings: Vec::new(),
    };

    let local = Snapshot::build(RootSource::Local(args.local.clone()), &options)?;
    let remote = Snapshot::build(RootSource::Remote(listing), &options)?;

    println!("=== SNAPSHOTS ===");
    println!("Local:  {} entries ({} warnings)", local.len(), local.warnings().len());
    println!("Remote: {} entries ({} warnings)", remote.len(), remote.warnings().len());
    for warning in local.warnings().iter().chain(remote.warnings()) {
        println!("  ! {}", warning);
    }
    println!();

    let engine = project.diff_engine(&app);
    let changes = match args.direction {
        SyncDirection::LocalToRemote => engine.diff(&remote, &local),
        SyncDirection::RemoteToLocal => engine.diff(&local, &remote),
    };

    println!("=== CHANGES ({}) ===", args.direction);
    for change in changes.iter() {
        let marker = match change.kind {
            ChangeKind::New => "+",
            ChangeKind::Modified if change.is_replacement() => "!",
            ChangeKind::Modified => "~",
            ChangeKind::Deleted => "-",
            ChangeKind::Unchanged => "=",
        };
        let old = change.old.as_ref().map(|e| e.describe()).unwrap_or_default();
        let new = change.new.as_ref().map(|e| e.describe()).unwrap_or_default();
        println!("  {} {:<40} {} -> {}", marker, change.path, old, new);
    }
    println!("  {:?}", changes.summary());
    println!();

    let plan = SyncPlanner::new().plan(&changes, args.direction, &BTreeSet::new());
    println!("=== PLAN (no deletions approved) ===");
    for (i, action) in plan.iter().enumerate() {
        println!("  [{}] {}", i, action);
    }
    for path in &plan.pending {
        println!("  pending:  {}", path);
    }
    for path in &plan.deferred {
        println!("  deferred: {}", path);
    }

    Ok(())
}
