//! DagQuota CLI: `dagq` command.
//!
//! Recomputes per-user storage usage from a DAG fixture, answers write
//! admission queries and inspects usage snapshots.

mod fixture;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;

use dag_quota::{
    ConfiguredQuota, QuotaConfig, QuotaError, QuotaFilter, SnapshotStore, WriterIdentity,
};

use fixture::Fixture;

// ── CLI structure ─────────────────────────────────────────────────────────────

/// DagQuota CLI: account storage used by content-addressed DAGs.
#[derive(Parser, Debug)]
#[command(
    name = "dagq",
    about = "DagQuota CLI",
    version,
    long_about = "dagq: DagQuota CLI\n\nRecompute per-user storage usage from a DAG fixture, check\nwhether a write fits a quota, and inspect usage snapshots."
)]
struct Cli {
    /// Quota configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recompute every user's usage and store the snapshot
    Recompute {
        /// JSON fixture with blocks, pointers and users
        #[arg(long)]
        fixture: PathBuf,

        /// Snapshot destination (overrides the configured path)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Print usages as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a writer may store SIZE more bytes
    Check {
        /// JSON fixture with blocks, pointers and users
        #[arg(long)]
        fixture: PathBuf,

        /// Writer identity
        #[arg(long)]
        writer: String,

        /// Size of the write in bytes
        #[arg(long)]
        size: i64,
    },

    /// Inspect usage snapshots
    Snapshot {
        #[command(subcommand)]
        subcommand: SnapshotCommands,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// Print the usages stored in a snapshot file
    Show {
        /// Snapshot file
        path: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Recompute {
            fixture,
            snapshot,
            json,
        } => cmd_recompute(cli.config.as_deref(), &fixture, snapshot, json).await,
        Commands::Check {
            fixture,
            writer,
            size,
        } => cmd_check(cli.config.as_deref(), &fixture, &writer, size).await,
        Commands::Snapshot { subcommand } => match subcommand {
            SnapshotCommands::Show { path } => cmd_snapshot_show(&path),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<QuotaConfig> {
    match path {
        Some(path) => QuotaConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(QuotaConfig::default()),
    }
}

/// Build a filter over the fixture and account every registered user.
async fn recomputed_filter(config: QuotaConfig, fixture: &Path) -> Result<QuotaFilter> {
    let loaded = Fixture::read(fixture)?.load()?;
    debug!(
        "Loaded {} blocks from {}",
        loaded.store.block_count(),
        fixture.display()
    );
    let quota = Arc::new(ConfiguredQuota::from_config(&config));
    let filter = QuotaFilter::new(config, loaded.backends(), quota)?;
    filter
        .recompute_all()
        .await
        .context("usage recomputation failed")?;
    Ok(filter)
}

// ── Command implementations ───────────────────────────────────────────────────

/// `dagq recompute --fixture F [--snapshot P] [--json]`
async fn cmd_recompute(
    config: Option<&Path>,
    fixture: &Path,
    snapshot: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(path) = snapshot {
        config.snapshot_path = path;
    }
    let snapshot_path = config.snapshot_path.clone();

    let filter = recomputed_filter(config, fixture).await?;
    let usages = filter.usages();

    if json {
        println!("{}", serde_json::to_string_pretty(&usages)?);
    } else {
        println!("Usage ({} user(s)):", usages.len());
        for (username, used) in &usages {
            println!(
                "  {username:<20} {used:>14} / {} bytes",
                filter.quota_of(username)
            );
        }
    }

    filter
        .write_snapshot()
        .with_context(|| format!("failed to write snapshot {}", snapshot_path.display()))?;
    if !json {
        println!("Snapshot written to {}", snapshot_path.display());
    }
    Ok(())
}

/// `dagq check --fixture F --writer W --size N`
async fn cmd_check(config: Option<&Path>, fixture: &Path, writer: &str, size: i64) -> Result<()> {
    let config = load_config(config)?;
    let filter = recomputed_filter(config, fixture).await?;
    let writer = WriterIdentity::new(writer);

    match filter.allow_write(&writer, size) {
        Ok(()) => {
            println!("allowed: {writer} may write {size} bytes");
            Ok(())
        }
        Err(QuotaError::QuotaExceeded {
            owner, used, quota, ..
        }) => Err(anyhow!(
            "rejected: {writer} (owner {owner}) uses {used} of {quota} bytes, cannot write {size} more"
        )),
        Err(e) => Err(e.into()),
    }
}

/// `dagq snapshot show PATH`
fn cmd_snapshot_show(path: &Path) -> Result<()> {
    let snapshot = SnapshotStore::new(path.to_path_buf()).load()?;

    println!("Snapshot: {}", path.display());
    println!("  Users ({}):", snapshot.usages.len());
    for (username, used) in &snapshot.usages {
        println!("    {username:<20} {used:>14} bytes");
    }
    if !snapshot.writers.is_empty() {
        println!("  Writers ({}):", snapshot.writers.len());
        for (writer, view) in &snapshot.writers {
            println!(
                "    {writer}  owner={}  root={}  retained={}  owned={}",
                view.owner,
                view.root,
                view.direct_retained,
                view.owned_keys.len()
            );
        }
    }
    Ok(())
}
