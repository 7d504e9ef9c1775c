//! Data models for media reports.
//!
//! [`MediaReport`] is the composite every media probe writes into. Each
//! top-level field is owned by exactly one probe and starts out as `None`;
//! a field still `None` after a run means its probe failed or did not finish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::orchestrator::{CompositeResult, RunSummary};

/// Names of the composite fields, as claimed by probes in the registry.
pub mod fields {
    pub const FORMAT: &str = "format";
    pub const STREAMS: &str = "streams";
    pub const LOUDNESS: &str = "loudness";
    pub const VOLUME: &str = "volume";
    pub const BLACK_SEGMENTS: &str = "black_segments";
    pub const SILENCE_SEGMENTS: &str = "silence_segments";
    pub const INTERLACE: &str = "interlace";
}

/// Container-level information from ffprobe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Short container name(s), e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub format_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_long_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    pub stream_count: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    Other,
}

impl From<&str> for StreamKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "video" => StreamKind::Video,
            "audio" => StreamKind::Audio,
            "subtitle" => StreamKind::Subtitle,
            "data" => StreamKind::Data,
            "attachment" => StreamKind::Attachment,
            _ => StreamKind::Other,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "Video"),
            StreamKind::Audio => write!(f, "Audio"),
            StreamKind::Subtitle => write!(f, "Subtitle"),
            StreamKind::Data => write!(f, "Data"),
            StreamKind::Attachment => write!(f, "Attachment"),
            StreamKind::Other => write!(f, "Other"),
        }
    }
}

/// One elementary stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StreamInfo {
    /// Returns `WIDTHxHEIGHT` for video streams.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }
}

/// EBU R128 loudness summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loudness {
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f64,
    /// Gating threshold of the integrated measurement in LUFS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated_threshold_lufs: Option<f64>,
    /// Loudness range in LU.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness_range_lu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lra_low_lufs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lra_high_lufs: Option<f64>,
    /// True peak in dBFS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_peak_dbfs: Option<f64>,
}

/// Output of ffmpeg's `volumedetect` filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub mean_volume_db: f64,
    pub max_volume_db: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
}

/// A time range detected by an ffmpeg filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_secs: f64,
    /// `None` when the segment runs to the end of the analysed window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Field order verdict from ffmpeg's `idet` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
    Progressive,
    TopFieldFirst,
    BottomFieldFirst,
    Undetermined,
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldOrder::Progressive => write!(f, "Progressive"),
            FieldOrder::TopFieldFirst => write!(f, "Interlaced (TFF)"),
            FieldOrder::BottomFieldFirst => write!(f, "Interlaced (BFF)"),
            FieldOrder::Undetermined => write!(f, "Undetermined"),
        }
    }
}

/// Multi-frame interlace detection counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlaceStats {
    pub tff: u64,
    pub bff: u64,
    pub progressive: u64,
    pub undetermined: u64,
    pub verdict: FieldOrder,
}

/// Composite written by the media probes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streams: Option<Vec<StreamInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loudness: Option<Loudness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_segments: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silence_segments: Option<Vec<Segment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interlace: Option<InterlaceStats>,
}

impl MediaReport {
    /// Streams of the given kind, empty if the streams probe did not run.
    pub fn streams_of(&self, kind: StreamKind) -> Vec<&StreamInfo> {
        self.streams
            .iter()
            .flatten()
            .filter(|s| s.kind == kind)
            .collect()
    }
}

/// Report for one analysed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub media: MediaReport,
    pub run: RunSummary,
}

impl From<(String, CompositeResult<MediaReport>)> for FileReport {
    fn from((path, result): (String, CompositeResult<MediaReport>)) -> Self {
        Self {
            path,
            media: result.data,
            run: result.summary,
        }
    }
}

/// Metadata about a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    pub probes: Vec<String>,
    pub deadline_secs: u64,
    pub files_analyzed: usize,
    /// Files where at least one probe failed or did not finish.
    pub files_incomplete: usize,
    pub duration_seconds: f64,
}

/// Everything written to the output file.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub metadata: ReportMetadata,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    /// True when any file has a failed or unfinished probe.
    pub fn has_incomplete(&self) -> bool {
        self.files.iter().any(|f| !f.run.warnings.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, kind: StreamKind) -> StreamInfo {
        StreamInfo {
            index,
            kind,
            codec_name: "h264".to_string(),
            profile: None,
            width: Some(1920),
            height: Some(1080),
            pixel_format: None,
            frame_rate: None,
            sample_rate: None,
            channels: None,
            channel_layout: None,
            bit_rate: None,
            duration_secs: None,
            language: None,
        }
    }

    #[test]
    fn test_stream_kind_from_str() {
        assert_eq!(StreamKind::from("video"), StreamKind::Video);
        assert_eq!(StreamKind::from("AUDIO"), StreamKind::Audio);
        assert_eq!(StreamKind::from("weird"), StreamKind::Other);
    }

    #[test]
    fn test_resolution() {
        assert_eq!(
            stream(0, StreamKind::Video).resolution(),
            Some("1920x1080".to_string())
        );
        let mut audio = stream(1, StreamKind::Audio);
        audio.width = None;
        assert_eq!(audio.resolution(), None);
    }

    #[test]
    fn test_streams_of() {
        let mut report = MediaReport::default();
        assert!(report.streams_of(StreamKind::Video).is_empty());

        report.streams = Some(vec![
            stream(0, StreamKind::Video),
            stream(1, StreamKind::Audio),
            stream(2, StreamKind::Audio),
        ]);
        assert_eq!(report.streams_of(StreamKind::Audio).len(), 2);
    }

    #[test]
    fn test_empty_report_serializes_to_empty_object() {
        let json = serde_json::to_string(&MediaReport::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
