//! mediaprobe - parallel media file inspection
//!
//! Runs independent ffprobe/ffmpeg probes against each media file under a
//! shared deadline and writes a Markdown or JSON report of whatever
//! finished in time.
//!
//! Exit codes:
//!   0 - Success (or incomplete files without --strict)
//!   1 - Runtime error (bad config, unknown probe, unreadable input, interrupt)
//!   2 - Some probe failed or missed the deadline, with --strict

mod cli;
mod config;
mod error;
mod models;
mod orchestrator;
mod probes;
mod report;
mod scanner;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use error::RegistryError;
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use models::{BatchReport, FileReport, MediaReport, ReportMetadata};
use orchestrator::{Orchestrator, Registry};
use probes::{MediaInput, ToolConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(log_level(&args, &config));

    info!("mediaprobe v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_batch(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .mediaprobe.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize deadlines, tool paths, probes, and more.");
    Ok(())
}

/// Quiet wins over verbose; verbose may come from the flag or the config file.
fn log_level(args: &Args, config: &Config) -> tracing::Level {
    if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    }
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run every selected probe over every input file. Returns exit code.
async fn run_batch(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Resolve the input files
    let scan_config = scanner::ScanConfig::from(&config.scanner);
    let files = scanner::MediaScanner::new(scan_config).scan(&args.inputs)?;
    info!(files = files.len(), "Found media files");

    // Step 2: Build the probe registry
    let tools = Arc::new(config.tool_config());
    let registry = match build_registry(tools, &config.probes.enabled) {
        Ok(registry) => registry,
        Err(e) => {
            error!(kind = e.as_label(), error = %e, "Invalid probe selection");
            return Err(e.into());
        }
    };

    if args.dry_run {
        return handle_dry_run(&files, &registry);
    }

    if files.is_empty() {
        anyhow::bail!("No media files found in the given inputs");
    }

    // Step 3: Probe the files
    let orchestrator = Orchestrator::new(config.orchestrator_config());
    let shutdown = CancellationToken::new();
    spawn_interrupt_handler(shutdown.clone());

    let progress = create_progress_bar(files.len(), args.quiet);
    let concurrency = config.general.concurrency.max(1);

    let files = analyze_files(
        &orchestrator,
        &registry,
        files,
        concurrency,
        &shutdown,
        &progress,
    )
    .await?;
    progress.finish_and_clear();

    // Step 4: Build the report
    let duration = start_time.elapsed().as_secs_f64();
    let files_incomplete = files.iter().filter(|f| !f.run.warnings.is_empty()).count();

    let report = BatchReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            probes: registry.names().into_iter().map(String::from).collect(),
            deadline_secs: orchestrator.config().deadline.as_secs(),
            files_analyzed: files.len(),
            files_incomplete,
            duration_seconds: duration,
        },
        files,
    };

    // Step 5: Render and write
    let rendered = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output: Option<PathBuf> = config.general.output.as_ref().map(PathBuf::from);
    match output {
        Some(ref path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => println!("{}", rendered),
    }

    if !args.quiet {
        print_summary(&report, output.as_ref());
    }

    if shutdown.is_cancelled() {
        eprintln!("\n⛔ Interrupted. The report only covers what finished in time.");
        return Ok(1);
    }

    if args.strict && report.has_incomplete() {
        eprintln!(
            "\n⛔ {} file(s) have failed or unfinished probes. Failing (exit code 2).",
            report.metadata.files_incomplete
        );
        return Ok(2);
    }

    Ok(0)
}

/// The default registry narrowed to the enabled probes.
fn build_registry(
    tools: Arc<ToolConfig>,
    enabled: &[String],
) -> Result<Registry<MediaInput, MediaReport>, RegistryError> {
    let registry = probes::default_registry(tools).select(enabled)?;
    registry.validate()?;
    Ok(registry)
}

/// Probe up to `concurrency` files at once. Reports come back sorted by path.
async fn analyze_files(
    orchestrator: &Orchestrator,
    registry: &Registry<MediaInput, MediaReport>,
    files: Vec<PathBuf>,
    concurrency: usize,
    shutdown: &CancellationToken,
    progress: &ProgressBar,
) -> Result<Vec<FileReport>> {
    let mut reports: Vec<FileReport> = stream::iter(files)
        .map(move |path| async move {
            let shown = path.display().to_string();
            let span = info_span!("file", path = %shown);
            let input = Arc::new(MediaInput::new(path));

            let result = orchestrator
                .run(input, registry, shutdown)
                .instrument(span)
                .await;

            progress.inc(1);
            progress.set_message(shown.clone());
            result.map(|composite| FileReport::from((shown, composite)))
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    reports.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(reports)
}

/// Cancel the whole batch on Ctrl-C. Running probes stop, and every file
/// still gets a partial result.
fn spawn_interrupt_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Interrupt received, stopping probes");
                    shutdown.cancel();
                }
                Err(e) => debug!(error = %e, "Cannot listen for Ctrl-C"),
            },
        }
    });
}

fn create_progress_bar(len: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb
}

/// Handle --dry-run: list files and probes, exit.
fn handle_dry_run(files: &[PathBuf], registry: &Registry<MediaInput, MediaReport>) -> Result<i32> {
    println!("\n🔍 Dry run: no probes will be started.\n");
    println!("   Probes: {}", registry.names().join(", "));

    if files.is_empty() {
        println!("   No matching media files found.");
    } else {
        println!("   Found {} files that would be analyzed:\n", files.len());
        for file in files {
            println!("     🎞  {}", file.display());
        }
        println!("\n   Total: {} files", files.len());
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

fn print_summary(report: &BatchReport, output: Option<&PathBuf>) {
    let metadata = &report.metadata;
    eprintln!("\n📊 Summary:");
    eprintln!("   Files analyzed: {}", metadata.files_analyzed);
    eprintln!("   Files incomplete: {}", metadata.files_incomplete);
    let cut_short = report
        .files
        .iter()
        .filter(|f| !f.run.outcome.is_complete())
        .count();
    if cut_short > 0 {
        eprintln!("   Files cut short by deadline or interrupt: {}", cut_short);
    }
    for file in report.files.iter().filter(|f| !f.run.warnings.is_empty()) {
        let probes: Vec<&str> = file.run.warnings.iter().map(|w| w.probe.as_str()).collect();
        eprintln!(
            "   - {} ({}): {}",
            file.path,
            file.run.outcome,
            probes.join(", ")
        );
    }
    eprintln!("   Duration: {:.1}s", metadata.duration_seconds);
    if let Some(path) = output {
        eprintln!("\n✅ Report saved to: {}", path.display());
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    Ok(Config::load_default()?.unwrap_or_default())
}
