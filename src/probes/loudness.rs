//! EBU R128 loudness via ffmpeg's `ebur128` filter.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Loudness, MediaReport};
use crate::orchestrator::{Mutator, RunContext};

use super::ffmpeg::{build_filter_args, value_after, FilterKind};
use super::tool::run_tool;
use super::{MediaInput, ToolConfig};

const FILTER: &str = "ebur128=peak=true";

/// Probe `loudness`.
pub async fn probe_loudness(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_filter_args(&input.path, FilterKind::Audio, FILTER, tools.analysis_seconds);
    let output = run_tool(&ctx, &tools.ffmpeg, &args).await?;
    let loudness = parse_ebur128_summary(&output.stderr)?;

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.loudness = Some(loudness);
    }))
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Integrated,
    Range,
    Peak,
}

/// Parses the `Summary:` block ebur128 prints at the end of the run.
///
/// Per-frame lines before the summary are ignored. Fails if no integrated
/// loudness could be read, e.g. when the input has no audio stream.
pub fn parse_ebur128_summary(log: &str) -> Result<Loudness> {
    let summary = log
        .rfind("Summary:")
        .map(|idx| &log[idx..])
        .context("ebur128 summary not found in ffmpeg output")?;

    let mut section = Section::None;
    let mut integrated = None;
    let mut loudness = Loudness::default();

    for line in summary.lines().map(str::trim) {
        if line.starts_with("Integrated loudness:") {
            section = Section::Integrated;
        } else if line.starts_with("Loudness range:") {
            section = Section::Range;
        } else if line.starts_with("True peak:") {
            section = Section::Peak;
        } else if line.starts_with("I:") && section == Section::Integrated {
            integrated = value_after(line, "I:");
        } else if line.starts_with("Threshold:") && section == Section::Integrated {
            loudness.integrated_threshold_lufs = value_after(line, "Threshold:");
        } else if line.starts_with("LRA low:") {
            loudness.lra_low_lufs = value_after(line, "LRA low:");
        } else if line.starts_with("LRA high:") {
            loudness.lra_high_lufs = value_after(line, "LRA high:");
        } else if line.starts_with("LRA:") {
            loudness.loudness_range_lu = value_after(line, "LRA:");
        } else if line.starts_with("Peak:") && section == Section::Peak {
            loudness.true_peak_dbfs = value_after(line, "Peak:");
        }
    }

    loudness.integrated_lufs =
        integrated.context("integrated loudness missing from ebur128 summary")?;
    Ok(loudness)
}
