//! bindeval - incremental evaluation of protein binder designs
//!
//! ## Commands
//!
//! - `run`: fetch new work units, score their designs and merge the ledger
//! - `status`: show remote, processed and pending work units
//! - `export`: write sequence exports from the current ledger
//! - `archive`: move old work units below an archive prefix on the remote

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bindeval_core::{
    execute_archive, plan_archive, write_af3_jobs, write_atomic, write_binder_fasta, Ledger,
    PdbSequenceExtractor, WorkTracker,
};
use bindeval_fold::{
    CommandEngine, IncrementalRunner, PredictionSubmitter, RunnerConfig, SubmitterConfig,
    UnitPipeline,
};
use bindeval_state::FsPredictionCache;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn, Level};

use crate::config::EvalConfig;

#[derive(Parser)]
#[command(name = "bindeval")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental evaluation pipeline for protein binder designs", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "BINDEVAL_CONFIG", default_value = "bindeval.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every work unit not yet in the ledger
    Run {
        /// Reprocess this unit even if it is already recorded (repeatable)
        #[arg(long = "force", value_name = "UNIT")]
        force: Vec<String>,

        /// Also write the run report as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Show remote, processed and pending work units
    Status,

    /// Write sequence exports from the ledger
    Export {
        #[command(subcommand)]
        format: ExportFormat,
    },

    /// Move dated work units at or before a cutoff below an archive prefix
    Archive {
        /// Cutoff as YYMM; folders dated at or before it are moved
        #[arg(long)]
        cutoff: String,

        /// Destination prefix on the remote
        #[arg(long, default_value = "snake-venom-binder")]
        archive_prefix: String,

        /// Print the plan without moving anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ExportFormat {
    /// Binder FASTA, one record per design with a binder sequence
    Fasta {
        /// Output path (default: the configured binder FASTA path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// AlphaFold server batch job JSON
    Af3 {
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    bindeval_core::init_tracing(cli.json, level);

    let config = EvalConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { force, report_json } => {
            cmd_run(&config, &force, report_json.as_deref()).await
        }
        Commands::Status => cmd_status(&config).await,
        Commands::Export { format } => match format {
            ExportFormat::Fasta { output } => cmd_export_fasta(&config, output.as_deref()),
            ExportFormat::Af3 { output } => cmd_export_af3(&config, &output),
        },
        Commands::Archive {
            cutoff,
            archive_prefix,
            dry_run,
        } => cmd_archive(&config, &cutoff, &archive_prefix, dry_run).await,
    }
}

fn load_ledger(config: &EvalConfig) -> Result<Ledger> {
    Ledger::load(&config.paths.ledger)
        .with_context(|| format!("Failed to load ledger {}", config.paths.ledger.display()))
}

async fn cmd_run(config: &EvalConfig, force: &[String], report_json: Option<&Path>) -> Result<()> {
    let remote = config.remote_store().context("Invalid remote configuration")?;

    let cache = FsPredictionCache::new(&config.paths.results, config.claim_stale_after())
        .context("Failed to open prediction cache")?;
    let engine = CommandEngine::new(config.engine.command.clone(), &config.paths.results)
        .with_env(config.engine.env.clone());
    let submitter = Arc::new(PredictionSubmitter::new(
        Arc::new(engine),
        Arc::new(cache),
        SubmitterConfig {
            max_concurrent_jobs: config.engine.max_concurrent_jobs,
            job_timeout: config.job_timeout(),
            job_inputs_dir: config.paths.job_inputs.clone(),
        },
    ));
    let pipeline = Arc::new(UnitPipeline::new(
        submitter,
        Arc::new(PdbSequenceExtractor),
        config.pipeline.join_key,
    ));
    let runner = IncrementalRunner::new(
        remote,
        pipeline,
        RunnerConfig {
            remote_prefix: config.remote.prefix.clone(),
            local_root: config.paths.work_dir.clone(),
            ledger_path: config.paths.ledger.clone(),
            binder_fasta_path: config.paths.binder_fasta.clone(),
            max_parallel_units: config.pipeline.max_parallel_units,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight units");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = runner.run(force, shutdown_rx).await?;

    if let Some(path) = report_json {
        let json = serde_json::to_vec_pretty(&report)?;
        write_atomic(path, &json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    println!("Run {}: {}", report.run_id, report.summary());
    for failure in &report.failed {
        println!("  failed  {}: {}", failure.unit_id, failure.error);
    }
    for unit in &report.skipped {
        println!("  skipped {unit}");
    }
    if report.diagnostic_count() > 0 {
        println!("  {} diagnostics (see log)", report.diagnostic_count());
    }
    Ok(())
}

async fn cmd_status(config: &EvalConfig) -> Result<()> {
    let remote = config.remote_store().context("Invalid remote configuration")?;
    let ledger = load_ledger(config)?;
    let tracker = WorkTracker::from_ledger(&ledger);

    let available = remote
        .list_folders(&config.remote.prefix)
        .await
        .context("Failed to list remote work units")?;
    let pending = tracker.discover_new_units(&available, &[]);

    println!("Remote units:    {}", available.len());
    println!("Processed units: {}", tracker.processed().len());
    println!("Ledger rows:     {}", ledger.len());
    if pending.is_empty() {
        println!("No pending units.");
    } else {
        println!("Pending units:");
        for unit in &pending {
            println!("  {unit}");
        }
    }
    Ok(())
}

fn cmd_export_fasta(config: &EvalConfig, output: Option<&Path>) -> Result<()> {
    let ledger = load_ledger(config)?;
    let path = output.unwrap_or(config.paths.binder_fasta.as_path());
    let report = write_binder_fasta(path, ledger.designs())?;
    println!(
        "Wrote {} binder sequences to {} ({} skipped)",
        report.written,
        path.display(),
        report.diagnostics.len()
    );
    Ok(())
}

fn cmd_export_af3(config: &EvalConfig, output: &Path) -> Result<()> {
    let ledger = load_ledger(config)?;
    if ledger.is_empty() {
        bail!("Ledger {} has no designs to export", config.paths.ledger.display());
    }
    let report = write_af3_jobs(output, ledger.designs())?;
    println!(
        "Wrote {} AlphaFold server jobs to {} ({} skipped)",
        report.written,
        output.display(),
        report.diagnostics.len()
    );
    Ok(())
}

async fn cmd_archive(
    config: &EvalConfig,
    cutoff: &str,
    archive_prefix: &str,
    dry_run: bool,
) -> Result<()> {
    let remote = config.remote_store().context("Invalid remote configuration")?;
    let folders = remote
        .list_folders("")
        .await
        .context("Failed to list remote folders")?;
    let plan = plan_archive(&folders, cutoff, archive_prefix)?;

    for skipped in &plan.skipped {
        info!(folder = %skipped.folder, reason = %skipped.reason, "folder kept");
    }
    if dry_run {
        println!("Would move {} folders to {}/:", plan.to_move.len(), plan.archive_prefix);
        for folder in &plan.to_move {
            println!("  {folder}");
        }
        return Ok(());
    }

    let report = execute_archive(remote.as_ref(), &plan).await;
    println!(
        "Moved {} folders ({} objects) to {}/",
        report.folders_moved, report.objects_moved, plan.archive_prefix
    );
    if !report.diagnostics.is_empty() {
        for diag in &report.diagnostics {
            println!("  failed {}", diag.message);
        }
        bail!("{} folders could not be archived", report.diagnostics.len());
    }
    Ok(())
}
