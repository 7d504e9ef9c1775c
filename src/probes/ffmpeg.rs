//! Shared plumbing for probes that run an ffmpeg filter and read its log.
//!
//! Analysis filters write their findings to stderr. Each probe builds a
//! `-f null` pipeline around one filter and scrapes `key: value` pairs from
//! the log lines.

use std::path::Path;

/// Where the filter goes in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Audio,
    Video,
}

/// ffmpeg arguments running `filter` over `path` without writing output.
///
/// `window_secs` limits analysis to the first N seconds of the input.
pub fn build_filter_args(
    path: &Path,
    kind: FilterKind,
    filter: &str,
    window_secs: Option<u64>,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostats", "-nostdin", "-loglevel", "info"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(secs) = window_secs.filter(|s| *s > 0) {
        args.push("-t".to_string());
        args.push(secs.to_string());
    }

    args.push("-i".to_string());
    args.push(path.to_string_lossy().to_string());

    match kind {
        FilterKind::Audio => {
            args.push("-vn".to_string());
            args.push("-af".to_string());
        }
        FilterKind::Video => {
            args.push("-an".to_string());
            args.push("-vf".to_string());
        }
    }
    args.push(filter.to_string());

    args.extend(["-f", "null", "-"].iter().map(|s| s.to_string()));
    args
}

/// Returns the token following `key` in `line`, e.g. `"-23.0"` for
/// `token_after("I: -23.0 LUFS", "I:")`.
pub fn token_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let idx = line.find(key)?;
    let rest = line[idx + key.len()..].trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '|')
        .unwrap_or(rest.len());
    let token = &rest[..end];
    (!token.is_empty()).then_some(token)
}

/// Parses the number following `key` in `line`.
pub fn value_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    token_after(line, key)?.parse().ok()
}
