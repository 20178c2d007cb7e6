use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use triage_core::{load_snapshot, load_thresholds, render_html, render_json, Report, Severity};

#[derive(Parser, Debug)]
#[command(
    name = "triage",
    author,
    version,
    about = "Endpoint health triage reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a collected snapshot and write report.json + report.html
    Report {
        /// Path to the thresholds JSON document
        #[arg(long, value_name = "FILE")]
        thresholds: PathBuf,
        /// Directory containing the collected snapshot documents
        #[arg(long = "snapshot-dir", value_name = "DIR")]
        snapshot_dir: PathBuf,
        /// Output directory for the two report artifacts
        #[arg(long = "out-dir", value_name = "DIR")]
        out_dir: PathBuf,
        /// Also print the report JSON to stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate a thresholds document and print the effective values
    Thresholds {
        /// Path to the thresholds JSON document
        #[arg(long, value_name = "FILE")]
        thresholds: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Report {
            thresholds,
            snapshot_dir,
            out_dir,
            json,
        } => run_report(&thresholds, &snapshot_dir, &out_dir, json),
        Commands::Thresholds { thresholds } => show_thresholds(&thresholds),
    }
}

fn run_report(thresholds: &Path, snapshot_dir: &Path, out_dir: &Path, json: bool) -> Result<()> {
    let thresholds = load_thresholds(thresholds)
        .with_context(|| format!("failed to load thresholds from {}", thresholds.display()))?;
    let snapshot = load_snapshot(snapshot_dir)
        .with_context(|| format!("failed to load snapshot from {}", snapshot_dir.display()))?;

    let report = Report::build(thresholds, snapshot, Local::now().naive_local());

    // Build both artifact bodies before writing either, so a failing run
    // leaves no partial output behind.
    let json_body = render_json(&report)?;
    let html_body = render_html(&report);

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;
    let json_path = out_dir.join("report.json");
    let html_path = out_dir.join("report.html");
    fs::write(&json_path, &json_body)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    fs::write(&html_path, &html_body)
        .with_context(|| format!("failed to write {}", html_path.display()))?;

    if json {
        println!("{json_body}");
    }

    let oks = report
        .findings
        .len()
        .saturating_sub(report.alerts() + report.warnings());
    println!(
        "{}: {}  {}: {}  {}: {}",
        "ALERT".red().bold(),
        report.alerts(),
        "WARN".yellow().bold(),
        report.warnings(),
        Severity::Ok.as_str().green().bold(),
        oks
    );
    println!("Wrote: {}", json_path.display());
    println!("Wrote: {}", html_path.display());
    Ok(())
}

fn show_thresholds(path: &Path) -> Result<()> {
    let thresholds = load_thresholds(path)
        .with_context(|| format!("failed to load thresholds from {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&thresholds)?);
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
