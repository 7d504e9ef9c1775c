//! Container and stream probes backed by `ffprobe -print_format json`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{FormatInfo, MediaReport, StreamInfo, StreamKind};
use crate::orchestrator::{Mutator, RunContext};

use super::tool::run_tool;
use super::{MediaInput, ToolConfig};

/// Subset of ffprobe's JSON document. ffprobe prints most numbers as strings.
#[derive(Debug, Default, Deserialize)]
struct FfprobeDocument {
    #[serde(default)]
    format: Option<RawFormat>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_name: String,
    format_long_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    nb_streams: u32,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStream {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// ffprobe arguments printing one section as JSON.
pub fn build_ffprobe_args(path: &Path, section: &str) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        format!("-show_{}", section),
        path.to_string_lossy().to_string(),
    ]
}

/// Probe `format`: container information.
pub async fn probe_format(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_ffprobe_args(&input.path, "format");
    let output = run_tool(&ctx, &tools.ffprobe, &args).await?;
    let format = parse_format(&output.stdout)?;

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.format = Some(format);
    }))
}

/// Probe `streams`: one entry per elementary stream.
pub async fn probe_streams(
    ctx: RunContext,
    input: Arc<MediaInput>,
    tools: Arc<ToolConfig>,
) -> Result<Mutator<MediaReport>> {
    let args = build_ffprobe_args(&input.path, "streams");
    let output = run_tool(&ctx, &tools.ffprobe, &args).await?;
    let streams = parse_streams(&output.stdout)?;

    Ok(Mutator::new(move |report: &mut MediaReport| {
        report.streams = Some(streams);
    }))
}

/// Parses the `format` section of ffprobe JSON.
pub fn parse_format(json: &str) -> Result<FormatInfo> {
    let doc: FfprobeDocument =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON")?;
    let raw = doc
        .format
        .context("ffprobe output missing 'format' section")?;

    Ok(FormatInfo {
        format_name: raw.format_name,
        format_long_name: raw.format_long_name,
        duration_secs: parse_number(raw.duration.as_deref()),
        size_bytes: parse_number(raw.size.as_deref()),
        bit_rate: parse_number(raw.bit_rate.as_deref()),
        stream_count: raw.nb_streams,
        tags: raw.tags,
    })
}

/// Parses the `streams` section of ffprobe JSON.
pub fn parse_streams(json: &str) -> Result<Vec<StreamInfo>> {
    let doc: FfprobeDocument =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON")?;

    Ok(doc
        .streams
        .into_iter()
        .map(|raw| {
            let kind = StreamKind::from(raw.codec_type.as_str());
            let frame_rate = match kind {
                StreamKind::Video => raw
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_fps_fraction)
                    .or_else(|| raw.r_frame_rate.as_deref().and_then(parse_fps_fraction)),
                _ => None,
            };

            StreamInfo {
                index: raw.index,
                kind,
                codec_name: raw.codec_name,
                profile: raw.profile,
                width: raw.width,
                height: raw.height,
                pixel_format: raw.pix_fmt,
                frame_rate,
                sample_rate: parse_number(raw.sample_rate.as_deref()),
                channels: raw.channels,
                channel_layout: raw.channel_layout,
                bit_rate: parse_number(raw.bit_rate.as_deref()),
                duration_secs: parse_number(raw.duration.as_deref()),
                language: raw.tags.get("language").cloned(),
            }
        })
        .collect())
}

/// Parses a rational like `30000/1001`. Zero denominators and `0/0` yield `None`.
pub fn parse_fps_fraction(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };

    (value > 0.0).then_some(value)
}

fn parse_number<T: std::str::FromStr>(s: Option<&str>) -> Option<T> {
    s.and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "profile": "High",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "duration": "10.010000",
                "bit_rate": "4500000",
                "tags": { "language": "und" }
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 2,
                "channel_layout": "stereo",
                "r_frame_rate": "0/0",
                "tags": { "language": "eng" }
            }
        ],
        "format": {
            "filename": "clip.mp4",
            "nb_streams": 2,
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "format_long_name": "QuickTime / MOV",
            "duration": "10.010000",
            "size": "5800000",
            "bit_rate": "4635364",
            "tags": { "encoder": "Lavf60.3.100" }
        }
    }"#;

    #[test]
    fn test_build_args() {
        let args = build_ffprobe_args(Path::new("/tmp/a.mkv"), "streams");
        assert_eq!(args[4], "-show_streams");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/a.mkv"));
    }

    #[test]
    fn test_parse_format() {
        let format = parse_format(SAMPLE).unwrap();
        assert_eq!(format.format_name, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(format.duration_secs, Some(10.01));
        assert_eq!(format.size_bytes, Some(5_800_000));
        assert_eq!(format.bit_rate, Some(4_635_364));
        assert_eq!(format.stream_count, 2);
        assert_eq!(format.tags.get("encoder").map(String::as_str), Some("Lavf60.3.100"));
    }

    #[test]
    fn test_parse_format_missing_section() {
        assert!(parse_format(r#"{"streams": []}"#).is_err());
        assert!(parse_format("not json").is_err());
    }

    #[test]
    fn test_parse_streams() {
        let streams = parse_streams(SAMPLE).unwrap();
        assert_eq!(streams.len(), 2);

        let video = &streams[0];
        assert_eq!(video.kind, StreamKind::Video);
        assert_eq!(video.resolution(), Some("1920x1080".to_string()));
        let fps = video.frame_rate.unwrap();
        assert!((fps - 29.97).abs() < 0.01);
        assert_eq!(video.bit_rate, Some(4_500_000));

        let audio = &streams[1];
        assert_eq!(audio.kind, StreamKind::Audio);
        assert_eq!(audio.sample_rate, Some(48_000));
        assert_eq!(audio.channels, Some(2));
        assert_eq!(audio.frame_rate, None);
        assert_eq!(audio.language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_parse_fps_fraction() {
        assert_eq!(parse_fps_fraction("25/1"), Some(25.0));
        assert_eq!(parse_fps_fraction("0/0"), None);
        assert_eq!(parse_fps_fraction("24"), Some(24.0));
        assert_eq!(parse_fps_fraction("x/1"), None);
    }
}
