//! Interlace detection via ffmpeg's `idet` filter.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{FieldOrder, InterlaceStats, MediaReport};
use crate::orchestrator::{Mutator, RunContext};

use super::ffmpeg::{build_filter_args, value_after, FilterKind};
use super::tool::run_tool;
use super::{MediaInput, ToolConfig};

/// Probe `interlace`.
pub async fn probe_interlace(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_filter_args(&input.path, FilterKind::Video, "idet", tools.analysis_seconds);
    let output = run_tool(&ctx, &tools.ffmpeg, &args).await?;
    let stats = parse_idet(&output.stderr)?;

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.interlace = Some(stats);
    }))
}

/// Reads the `Multi frame detection:` line, which is steadier than the
/// single-frame counts.
pub fn parse_idet(log: &str) -> Result<InterlaceStats> {
    let line = log
        .lines()
        .rev()
        .find(|l| l.contains("Multi frame detection:"))
        .context("idet multi-frame summary not found in ffmpeg output")?;

    let count = |key: &str| -> Result<u64> {
        value_after(line, key).with_context(|| format!("idet summary missing {}", key))
    };

    let tff = count("TFF:")?;
    let bff = count("BFF:")?;
    let progressive = count("Progressive:")?;
    let undetermined = count("Undetermined:")?;

    Ok(InterlaceStats {
        tff,
        bff,
        progressive,
        undetermined,
        verdict: field_order(tff, bff, progressive),
    })
}

/// Majority vote between progressive and the two interlaced orders.
pub fn field_order(tff: u64, bff: u64, progressive: u64) -> FieldOrder {
    let interlaced = tff + bff;
    if progressive == 0 && interlaced == 0 {
        FieldOrder::Undetermined
    } else if progressive >= interlaced {
        FieldOrder::Progressive
    } else if tff >= bff {
        FieldOrder::TopFieldFirst
    } else {
        FieldOrder::BottomFieldFirst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
[Parsed_idet_0 @ 0x5611] Repeated Fields: Neither:  1000 Top:     0 Bottom:     0
[Parsed_idet_0 @ 0x5611] Single frame detection: TFF:   700 BFF:     0 Progressive:   100 Undetermined:   200
[Parsed_idet_0 @ 0x5611] Multi frame detection: TFF:   880 BFF:     2 Progressive:   110 Undetermined:     8
";

    #[test]
    fn test_parse_idet() {
        let stats = parse_idet(LOG).unwrap();
        assert_eq!(stats.tff, 880);
        assert_eq!(stats.bff, 2);
        assert_eq!(stats.progressive, 110);
        assert_eq!(stats.undetermined, 8);
        assert_eq!(stats.verdict, FieldOrder::TopFieldFirst);
    }

    #[test]
    fn test_missing_summary_fails() {
        assert!(parse_idet("Stream #0:0: Audio: aac").is_err());
    }

    #[test]
    fn test_field_order() {
        assert_eq!(field_order(0, 0, 0), FieldOrder::Undetermined);
        assert_eq!(field_order(1, 1, 900), FieldOrder::Progressive);
        assert_eq!(field_order(10, 500, 3), FieldOrder::BottomFieldFirst);
    }
}
