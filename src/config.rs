//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.mediaprobe.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::orchestrator::{OrchestratorConfig, DEFAULT_DEADLINE};
use crate::probes::{ToolConfig, PROBE_NAMES};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".mediaprobe.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Deadline and worker limits for one file.
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Probe selection.
    #[serde(default)]
    pub probes: ProbesConfig,

    /// Scanner settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report file path. Reports go to stdout when unset.
    #[serde(default)]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of files analyzed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    2
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Deadline covering every probe of one file.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Optional limit on a single probe attempt.
    #[serde(default)]
    pub probe_timeout_seconds: Option<u64>,

    /// Optional cap on probes running at once. Unlimited when unset.
    #[serde(default)]
    pub max_parallel_probes: Option<usize>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            probe_timeout_seconds: None,
            max_parallel_probes: None,
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_DEADLINE.as_secs()
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

/// Probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbesConfig {
    /// Probes to run, by name.
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,

    /// Only analyse the first N seconds with ffmpeg filters.
    #[serde(default)]
    pub analysis_seconds: Option<u64>,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            analysis_seconds: None,
        }
    }
}

fn default_enabled() -> Vec<String> {
    PROBE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files discovered by walking directories.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// File extensions treated as media.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names skipped while scanning.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            extensions: default_extensions(),
            excludes: default_excludes(),
        }
    }
}

fn default_max_files() -> usize {
    500
}

fn default_extensions() -> Vec<String> {
    vec![
        "mp4", "m4v", "mkv", "mov", "avi", "webm", "mxf", "ts", "m2ts", "mpg", "mpeg", "wmv",
        "flv", "wav", "mp3", "flac", "m4a", "aac", "ogg", "opus", "aiff",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excludes() -> Vec<String> {
    vec!["@eaDir", "$RECYCLE.BIN", "node_modules", "target"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only flags the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.to_string_lossy().to_string());
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(timeout) = args.timeout {
            self.orchestrator.timeout_seconds = timeout;
        }
        if args.probe_timeout.is_some() {
            self.orchestrator.probe_timeout_seconds = args.probe_timeout;
        }
        if args.max_parallel.is_some() {
            self.orchestrator.max_parallel_probes = args.max_parallel;
        }

        if let Some(ref ffprobe) = args.ffprobe {
            self.tools.ffprobe = ffprobe.clone();
        }
        if let Some(ref ffmpeg) = args.ffmpeg {
            self.tools.ffmpeg = ffmpeg.clone();
        }

        if let Some(ref probes) = args.probes {
            self.probes.enabled = probes.clone();
        }
        if args.analysis_seconds.is_some() {
            self.probes.analysis_seconds = args.analysis_seconds;
        }

        if let Some(max_files) = args.max_files {
            self.scanner.max_files = max_files;
        }
        if let Some(ref extensions) = args.extensions {
            self.scanner.extensions = extensions.clone();
        }
    }

    /// Orchestrator settings for one file.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            deadline: Duration::from_secs(self.orchestrator.timeout_seconds),
            probe_timeout: self
                .orchestrator
                .probe_timeout_seconds
                .map(Duration::from_secs),
            max_parallel: self.orchestrator.max_parallel_probes,
        }
    }

    /// Tool locations handed to every probe.
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            ffprobe: self.tools.ffprobe.clone(),
            ffmpeg: self.tools.ffmpeg.clone(),
            analysis_seconds: self.probes.analysis_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
