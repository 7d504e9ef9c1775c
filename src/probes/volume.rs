//! Mean and peak volume via ffmpeg's `volumedetect` filter.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{MediaReport, VolumeStats};
use crate::orchestrator::{Mutator, RunContext};

use super::ffmpeg::{build_filter_args, value_after, FilterKind};
use super::tool::run_tool;
use super::{MediaInput, ToolConfig};

/// Probe `volume`.
pub async fn probe_volume(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_filter_args(
        &input.path,
        FilterKind::Audio,
        "volumedetect",
        tools.analysis_seconds,
    );
    let output = run_tool(&ctx, &tools.ffmpeg, &args).await?;
    let volume = parse_volumedetect(&output.stderr)?;

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.volume = Some(volume);
    }))
}

/// Reads `mean_volume`, `max_volume` and `n_samples` from the filter log.
pub fn parse_volumedetect(log: &str) -> Result<VolumeStats> {
    let mut mean = None;
    let mut max = None;
    let mut samples = None;

    for line in log.lines().filter(|l| l.contains("volumedetect")) {
        mean = mean.or_else(|| value_after(line, "mean_volume:"));
        max = max.or_else(|| value_after(line, "max_volume:"));
        samples = samples.or_else(|| value_after(line, "n_samples:"));
    }

    Ok(VolumeStats {
        mean_volume_db: mean.context("mean_volume missing from volumedetect output")?,
        max_volume_db: max.context("max_volume missing from volumedetect output")?,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volumedetect() {
        let log = "\
[Parsed_volumedetect_0 @ 0x5603] n_samples: 960000
[Parsed_volumedetect_0 @ 0x5603] mean_volume: -20.5 dB
[Parsed_volumedetect_0 @ 0x5603] max_volume: -3.1 dB
[Parsed_volumedetect_0 @ 0x5603] histogram_3db: 12
";
        let stats = parse_volumedetect(log).unwrap();
        assert_eq!(stats.mean_volume_db, -20.5);
        assert_eq!(stats.max_volume_db, -3.1);
        assert_eq!(stats.samples, Some(960_000));
    }

    #[test]
    fn test_missing_values_fail() {
        let log = "[Parsed_volumedetect_0 @ 0x1] n_samples: 0\n";
        assert!(parse_volumedetect(log).is_err());
    }
}
