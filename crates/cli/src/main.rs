use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use media_consolidator_core::{
    collect_doctor_info, human_bytes, render_markdown_summary, CancelToken, Consolidator,
    ConsolidatorConfig, RunOptions, RunPhase, RunStatus, RunSummary,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const SUMMARY_FILE: &str = "consolidation-summary.json";
const MISSING_METADATA_FILE: &str = "missing-metadata.json";
const MARKDOWN_FILE: &str = "consolidation-summary.md";
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "media-consolidator",
    version,
    about = "Merge movie and series folders fragmented across /mnt/diskN volumes onto a single disk."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan every disk, consolidate fragmented items and write the run summary.
    Run(RunArgs),
    /// Show discovered disks, free space and backing mounts.
    Doctor(ConfigArgs),
    /// Print the effective configuration as JSON.
    ShowConfig(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the diskN mounts.
    #[arg(long, value_name = "DIR")]
    mount_root: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Decide and report without moving, deleting or creating anything on the disks.
    #[arg(long)]
    dry_run: bool,

    /// Also prune empty directories and junk files under every category root.
    #[arg(long, visible_alias = "force-clean")]
    deep_clean: bool,

    /// Lock file guarding against concurrent runs.
    #[arg(long, value_name = "FILE")]
    lock_file: Option<PathBuf>,

    /// Directory receiving the summary artifacts.
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,

    /// Directory receiving the rotating run log.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_consolidation_command(args),
        Commands::Doctor(args) => run_doctor_command(args),
        Commands::ShowConfig(args) => run_show_config_command(args),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<ConsolidatorConfig> {
    let mut config = ConsolidatorConfig::load(args.config.as_deref())?;
    if let Some(mount_root) = &args.mount_root {
        config.mount_root = mount_root.clone();
    }
    Ok(config)
}

fn run_consolidation_command(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.config)?;
    if let Some(lock_file) = args.lock_file {
        config.lock_file = lock_file;
    }
    if let Some(report_dir) = args.report_dir {
        config.report_dir = report_dir;
    }
    if let Some(log_dir) = args.log_dir {
        config.log_dir = log_dir;
    }

    let _guard = init_tracing(Some(&config.log_dir));

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        if !handler.is_cancelled() {
            eprintln!("signal received: stopping after the current file");
        }
        handler.cancel();
    })
    .context("failed to install signal handler")?;

    let options = RunOptions {
        dry_run: args.dry_run,
        deep_clean: args.deep_clean,
    };
    let report_dir = config.report_dir.clone();
    let consolidator = Consolidator::new(config).with_cancel_token(cancel);

    let summary = consolidator.run_with_callback(&options, |event| match event.phase {
        RunPhase::Scanning | RunPhase::Merging => {
            println!(
                "[{:>5}] {:?}: {}",
                event.seq,
                event.phase,
                event.detail.unwrap_or_default()
            );
        }
        RunPhase::Cancelling => println!("[{:>5}] stop requested", event.seq),
        _ => {}
    })?;

    write_artifacts(&report_dir, &summary)?;
    print_summary(&summary);
    println!("Summary written to {}", report_dir.join(SUMMARY_FILE).display());

    Ok(ExitCode::from(exit_code_for(summary.status)))
}

fn exit_code_for(status: RunStatus) -> u8 {
    match status {
        RunStatus::Cancelled => EXIT_CANCELLED,
        RunStatus::Completed => 0,
    }
}

fn write_artifacts(report_dir: &Path, summary: &RunSummary) -> Result<()> {
    fs::create_dir_all(report_dir)
        .with_context(|| format!("failed to create report dir {}", report_dir.display()))?;

    let payload = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    let path = report_dir.join(SUMMARY_FILE);
    fs::write(&path, payload)
        .with_context(|| format!("failed to write summary to {}", path.display()))?;

    let payload = serde_json::to_string_pretty(&summary.missing_metadata)
        .context("failed to serialize missing metadata list")?;
    let path = report_dir.join(MISSING_METADATA_FILE);
    fs::write(&path, payload)
        .with_context(|| format!("failed to write missing metadata to {}", path.display()))?;

    let path = report_dir.join(MARKDOWN_FILE);
    fs::write(&path, render_markdown_summary(summary))
        .with_context(|| format!("failed to write markdown summary to {}", path.display()))?;

    info!("artifacts written to {}", report_dir.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "{:<22} {:>7} {:>7} {:>13} {:>9}",
        "Category", "Items", "Whole", "Consolidated", "No space"
    );
    for category in &summary.categories {
        println!(
            "{:<22} {:>7} {:>7} {:>13} {:>9}",
            category.name,
            category.total_items,
            category.whole_items,
            category.consolidated_items,
            category.failed_no_space_items
        );
    }

    let totals = &summary.totals;
    println!();
    if summary.dry_run {
        println!(
            "Dry run: {} file(s) would move, {} failed checks.",
            totals.dry_run, totals.failed
        );
        println!(
            "{} orphaned temp file(s) would be removed.",
            totals.temp_files_removed
        );
    } else {
        println!(
            "Moved {} file(s) ({}), {} identical copies resolved, {} failed.",
            totals.committed,
            human_bytes(totals.bytes_moved),
            totals.skipped_identical,
            totals.failed
        );
        println!(
            "Removed {} junk file(s), {} orphaned temp file(s), {} empty director(ies).",
            totals.junk_removed, totals.temp_files_removed, totals.directories_removed
        );
    }
    println!(
        "{} item(s) missing a cover or metadata, {} warning(s).",
        summary.missing_metadata.len(),
        summary.warnings.len()
    );
    if summary.status == RunStatus::Cancelled {
        println!("Run was stopped before completion; the summary is partial.");
    }
}

fn run_doctor_command(args: ConfigArgs) -> Result<ExitCode> {
    let _guard = init_tracing(None);
    let config = load_config(&args)?;
    let info = collect_doctor_info(&config)?;

    println!("OS: {} ({})", info.os, info.arch);
    println!("Mount root: {}", info.mount_root);
    println!("Lock file: {}", info.lock_file);
    println!("Report dir: {}", info.report_dir);
    println!("Detected disks: {}", info.disks.len());
    for disk in info.disks {
        println!(
            "- {} [{}] free={} total={} fs={} backing={}",
            disk.id,
            disk.mount,
            human_bytes(disk.free_bytes),
            disk.total_bytes
                .map(human_bytes)
                .unwrap_or_else(|| "?".to_string()),
            disk.file_system.as_deref().unwrap_or("?"),
            disk.backing_mount.as_deref().unwrap_or("?")
        );
    }
    for note in info.notes {
        println!("Note: {}", note);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_show_config_command(args: ConfigArgs) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let payload = serde_json::to_string_pretty(&config).context("failed to serialize config")?;
    println!("{payload}");
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut failure = None;
    let (file_layer, guard) = match log_dir.map(open_log_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Some(Err(err)) => {
            failure = Some(err);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(filter)
        .try_init();

    if let Some(err) = failure {
        warn!("run log disabled: {:#}", err);
    }
    guard
}

fn open_log_appender(dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log dir {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("media-consolidator")
        .filename_suffix("log")
        .max_log_files(3)
        .build(dir)
        .with_context(|| format!("failed to open run log in {}", dir.display()))
}
