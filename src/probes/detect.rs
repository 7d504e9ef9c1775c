//! Black-frame and silence detection via `blackdetect` and `silencedetect`.

use std::sync::Arc;

use anyhow::Result;

use crate::models::{MediaReport, Segment};
use crate::orchestrator::{Mutator, RunContext};

use super::ffmpeg::{build_filter_args, value_after, FilterKind};
use super::tool::run_tool;
use super::{MediaInput, ToolConfig};

const BLACK_FILTER: &str = "blackdetect=d=0.5:pix_th=0.10";
const SILENCE_FILTER: &str = "silencedetect=noise=-50dB:d=1";

/// Probe `black`.
pub async fn probe_black(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_filter_args(
        &input.path,
        FilterKind::Video,
        BLACK_FILTER,
        tools.analysis_seconds,
    );
    let output = run_tool(&ctx, &tools.ffmpeg, &args).await?;
    let segments = parse_blackdetect(&output.stderr);

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.black_segments = Some(segments);
    }))
}

/// Probe `silence`.
pub async fn probe_silence(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_filter_args(
        &input.path,
        FilterKind::Audio,
        SILENCE_FILTER,
        tools.analysis_seconds,
    );
    let output = run_tool(&ctx, &tools.ffmpeg, &args).await?;
    let segments = parse_silencedetect(&output.stderr);

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.silence_segments = Some(segments);
    }))
}

/// One `black_start:.. black_end:.. black_duration:..` line per segment.
pub fn parse_blackdetect(log: &str) -> Vec<Segment> {
    log.lines()
        .filter(|l| l.contains("black_start:"))
        .filter_map(|line| {
            Some(Segment {
                start_secs: value_after(line, "black_start:")?,
                end_secs: value_after(line, "black_end:"),
                duration_secs: value_after(line, "black_duration:"),
            })
        })
        .collect()
}

/// `silence_start` and `silence_end` arrive on separate lines. A start with
/// no matching end means the silence runs to the end of the input.
pub fn parse_silencedetect(log: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut open: Option<f64> = None;

    for line in log.lines().filter(|l| l.contains("silencedetect")) {
        if let Some(start) = value_after::<f64>(line, "silence_start:") {
            if let Some(previous) = open.replace(start) {
                segments.push(open_segment(previous));
            }
        } else if let Some(end) = value_after::<f64>(line, "silence_end:") {
            let duration = value_after(line, "silence_duration:");
            let start = open
                .take()
                .or_else(|| duration.map(|d: f64| end - d))
                .unwrap_or(0.0);
            segments.push(Segment {
                start_secs: start,
                end_secs: Some(end),
                duration_secs: duration,
            });
        }
    }

    if let Some(start) = open {
        segments.push(open_segment(start));
    }
    segments
}

fn open_segment(start: f64) -> Segment {
    Segment {
        start_secs: start,
        end_secs: None,
        duration_secs: None,
    }
}
