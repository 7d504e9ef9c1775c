//! Command-line interface argument parsing.
//!
//! Flags left unset fall back to `.mediaprobe.toml`, then to built-in
//! defaults (see [`crate::config`]).

use clap::Parser;
use std::path::PathBuf;

use crate::probes::PROBE_NAMES;

/// mediaprobe - parallel media file inspection
///
/// Runs a set of independent probes (ffprobe metadata, loudness, volume,
/// black frames, silence, interlacing) against each media file under one
/// shared deadline, and reports whatever finished in time.
///
/// Examples:
///   mediaprobe movie.mkv
///   mediaprobe ./footage --format json --output report.json
///   mediaprobe clip.mp4 --probes format,streams,loudness --timeout 30
///   mediaprobe ./footage --dry-run
///   mediaprobe --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Media files or directories to analyze
    ///
    /// Directories are scanned recursively for known media extensions.
    #[arg(value_name = "PATH", required_unless_present = "init_config")]
    pub inputs: Vec<PathBuf>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .mediaprobe.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Deadline for all probes of one file, in seconds (default 120)
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Timeout for a single probe attempt, in seconds
    #[arg(long, value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Maximum number of probes running at once for one file
    #[arg(long, value_name = "NUM")]
    pub max_parallel: Option<usize>,

    /// Probes to run (comma-separated)
    ///
    /// Example: --probes format,streams,loudness
    #[arg(short, long, value_name = "NAMES", value_delimiter = ',')]
    pub probes: Option<Vec<String>>,

    /// Number of files analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Maximum number of files taken from input directories
    #[arg(long, value_name = "COUNT")]
    pub max_files: Option<usize>,

    /// File extensions treated as media when scanning directories (comma-separated)
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Path to the ffprobe binary
    #[arg(long, value_name = "PATH", env = "MEDIAPROBE_FFPROBE")]
    pub ffprobe: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long, value_name = "PATH", env = "MEDIAPROBE_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Only analyze the first N seconds with ffmpeg filters
    #[arg(long, value_name = "SECS")]
    pub analysis_seconds: Option<u64>,

    /// Exit with code 2 if any probe failed or missed the deadline
    ///
    /// Useful for CI pipelines.
    #[arg(long)]
    pub strict: bool,

    /// Dry run: list the files and probes without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .mediaprobe.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.inputs.is_empty() {
            return Err("At least one input path is required".to_string());
        }

        for input in &self.inputs {
            if !input.exists() {
                return Err(format!("Input path does not exist: {}", input.display()));
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.probe_timeout == Some(0) {
            return Err("Probe timeout must be at least 1 second".to_string());
        }

        if self.max_parallel == Some(0) {
            return Err("Max parallel probes must be at least 1".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.max_files == Some(0) {
            return Err("Max files must be at least 1".to_string());
        }

        if let Some(ref probes) = self.probes {
            if probes.is_empty() {
                return Err("--probes needs at least one probe name".to_string());
            }
            if let Some(unknown) = probes.iter().find(|p| !PROBE_NAMES.contains(&p.as_str())) {
                return Err(format!(
                    "Unknown probe '{}'. Available: {}",
                    unknown,
                    PROBE_NAMES.join(", ")
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
