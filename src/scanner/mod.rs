//! Media file discovery.
//!
//! Explicit file arguments are always kept, whatever their extension and
//! regardless of `max_files`. Directories are walked recursively, filtered by
//! extension, and capped at `max_files` discovered files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Media extensions, compared case-insensitively (e.g. ["mkv", "wav"])
    pub extensions: Vec<String>,
    /// Directory names to skip
    pub excludes: Vec<String>,
    /// Maximum number of files taken from directory walks
    pub max_files: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&crate::config::ScannerConfig::default())
    }
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excludes: config.excludes.clone(),
            max_files: Some(config.max_files),
        }
    }
}

/// Media file scanner.
pub struct MediaScanner {
    config: ScanConfig,
}

impl MediaScanner {
    /// Create a new scanner.
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Resolves inputs to a sorted, de-duplicated list of media files.
    pub fn scan(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut explicit = Vec::new();
        let mut walked = Vec::new();

        for input in inputs {
            if input.is_dir() {
                self.walk_dir(input, &mut walked)?;
            } else if input.is_file() {
                explicit.push(input.clone());
            } else {
                anyhow::bail!("Input path does not exist: {}", input.display());
            }
        }

        walked.sort();
        walked.dedup();
        walked.retain(|path| !explicit.contains(path));

        if let Some(max) = self.config.max_files {
            if walked.len() > max {
                debug!(found = walked.len(), max, "Truncating discovered file list");
                walked.truncate(max);
            }
        }

        let mut files = explicit;
        files.extend(walked);
        files.sort();
        files.dedup();

        Ok(files)
    }

    /// Check if a path has a media extension.
    pub fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|ext| self.config.extensions.contains(&ext))
    }

    /// Check if a directory entry should be skipped.
    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|p| *p == name)
    }

    fn walk_dir(&self, root: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() > 0 => {
                    debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read directory: {}", root.display())
                    })
                }
            };

            if entry.file_type().is_file() && self.is_media(entry.path()) {
                files.push(entry.into_path());
            }
        }

        Ok(())
    }
}
