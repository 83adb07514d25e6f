//! ethpulse CLI: build, inspect and probe daily ETH indicator snapshots.
//!
//! Commands:
//! - `build`: fetch every source, backfill and write the snapshot JSON
//! - `status`: summarise the last-known-good snapshot
//! - `probe`: report which egress paths are reachable

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ethpulse_core::net::{Fetcher, HttpFetcher, StaticFetcher};
use ethpulse_core::Snapshot;
use ethpulse_runner::{
    handle_refresh, write_atomic, Config, RefreshRequest, SnapshotBuilder, SnapshotStore,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "ethpulse", about = "ethpulse: point-in-time ETH indicator snapshots")]
struct Cli {
    /// Path to an ethpulse.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a snapshot and write it to the output location.
    Build {
        /// Target date (YYYY-MM-DD). Defaults to latest.
        #[arg(long)]
        date: Option<String>,

        /// Output file. Defaults to the configured snapshot path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Offline mode: no network access, values come from backfill only.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Summarise the last-known-good snapshot.
    Status,
    /// Probe every configured egress path.
    Probe,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            date,
            output,
            offline,
        } => run_build(&config, date.as_deref(), output, offline),
        Commands::Status => run_status(&config),
        Commands::Probe => run_probe(&config),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid --date '{raw}', expected YYYY-MM-DD"))
}

fn fetcher(config: &Config, offline: bool) -> Result<Box<dyn Fetcher>> {
    if offline {
        return Ok(Box::new(StaticFetcher::offline()));
    }
    let fetcher = HttpFetcher::new(config.to_egress()).context("build HTTP client")?;
    Ok(Box::new(fetcher))
}

fn run_build(
    config: &Config,
    date: Option<&str>,
    output: Option<PathBuf>,
    offline: bool,
) -> Result<()> {
    let target = date.map(parse_date).transpose()?;
    let output = output.unwrap_or_else(|| config.output.snapshot_path.clone());

    let builder = SnapshotBuilder::with_default_adapters(
        fetcher(config, offline)?,
        &config.adapter_settings(),
    );
    let store = SnapshotStore::new(&config.output.last_known_good_path);

    let snapshot = handle_refresh(&builder, &store, RefreshRequest::from_target(target));

    let json = serde_json::to_vec_pretty(&snapshot)?;
    write_atomic(&output, &json).with_context(|| format!("write {}", output.display()))?;
    info!(path = %output.display(), "snapshot written");

    print_summary(&snapshot, &output);
    Ok(())
}

fn print_summary(snapshot: &Snapshot, output: &Path) {
    println!("Snapshot: {}", output.display());
    println!("Generated: {}", snapshot.generated_at.to_rfc3339());
    if let Some(target) = snapshot.target_date {
        println!("Target: {target}");
    }
    println!(
        "Resolved: {}/{} required",
        snapshot.resolved_required(),
        ethpulse_core::REQUIRED_FIELDS.len()
    );
    if !snapshot.missing.is_empty() {
        let missing: Vec<&str> = snapshot.missing.iter().map(String::as_str).collect();
        println!("Missing: {}", missing.join(", "));
    }
    if !snapshot.errors.is_empty() {
        println!("Diagnostics:");
        for error in &snapshot.errors {
            println!("  - {error}");
        }
    }
}

fn run_status(config: &Config) -> Result<()> {
    let store = SnapshotStore::new(&config.output.last_known_good_path);
    if !store.path().exists() {
        println!("No last-known-good snapshot at {}", store.path().display());
        return Ok(());
    }

    println!("Last-known-good: {}", store.path().display());
    match store.meta() {
        Some(meta) => {
            println!("Generated: {}", meta.generated_at.to_rfc3339());
            if let Some(target) = meta.target_date {
                println!("Target: {target}");
            }
            println!("Fields: {}", meta.field_count);
            println!("Missing: {}", meta.missing_count);
            println!("Stored: {}", meta.stored_at.to_rfc3339());
            let verified = store.verify()?;
            println!(
                "Hash: {} ({})",
                meta.data_hash,
                if verified { "ok" } else { "MISMATCH" }
            );
        }
        None => println!("(no meta sidecar)"),
    }
    Ok(())
}

fn run_probe(config: &Config) -> Result<()> {
    let fetcher = fetcher(config, false)?;
    println!("{:<32} {:<6} {:<8} Error", "Path", "OK", "Status");
    println!("{}", "-".repeat(64));
    for probe in fetcher.probe() {
        println!(
            "{:<32} {:<6} {:<8} {}",
            probe.proxy,
            probe.ok,
            probe.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            probe.error.unwrap_or_default()
        );
    }
    Ok(())
}
