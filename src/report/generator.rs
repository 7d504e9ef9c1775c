//! Markdown and JSON report generation.

use crate::models::{BatchReport, FileReport, MediaReport, ReportMetadata, Segment, StreamKind};
use crate::orchestrator::RunSummary;
use anyhow::Result;
use std::fmt::Write as _;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &BatchReport) -> String {
    let mut output = String::new();

    output.push_str("# mediaprobe Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_overview_section(&report.files));

    for file in &report.files {
        output.push_str(&generate_file_section(file));
    }

    output.push_str(&generate_footer());
    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Version:** {}\n", metadata.tool_version));
    section.push_str(&format!("- **Probes:** {}\n", metadata.probes.join(", ")));
    section.push_str(&format!("- **Deadline:** {}s per file\n", metadata.deadline_secs));
    section.push_str(&format!(
        "- **Files Analyzed:** {}\n",
        metadata.files_analyzed
    ));
    if metadata.files_incomplete > 0 {
        section.push_str(&format!(
            "- **Files Incomplete:** {}\n",
            metadata.files_incomplete
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// One row per file with its run outcome.
fn generate_overview_section(files: &[FileReport]) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    if files.is_empty() {
        section.push_str("No media files were analyzed.\n\n");
        return section;
    }

    section.push_str("| File | Outcome | Applied | Failed | Pending | Time |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|---:|\n");
    for file in files {
        let run = &file.run;
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {}ms |\n",
            file.path,
            run.outcome,
            run.applied.len(),
            run.failed.len(),
            run.pending.len(),
            run.elapsed_ms
        ));
    }
    section.push('\n');

    section
}

/// Generate the section for a single file.
fn generate_file_section(file: &FileReport) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", file.path));
    section.push_str(&generate_media_block(&file.media));
    section.push_str(&generate_warnings_block(&file.run));

    section
}

fn generate_media_block(media: &MediaReport) -> String {
    let mut block = String::new();

    if let Some(ref format) = media.format {
        block.push_str("### Container\n\n");
        let long_name = format.format_long_name.as_deref().unwrap_or("");
        let _ = writeln!(block, "- **Format:** {} {}", format.format_name, long_name);
        if let Some(duration) = format.duration_secs {
            let _ = writeln!(block, "- **Duration:** {}", format_timestamp(duration));
        }
        if let Some(size) = format.size_bytes {
            let _ = writeln!(block, "- **Size:** {} bytes", size);
        }
        if let Some(bit_rate) = format.bit_rate {
            let _ = writeln!(block, "- **Bit rate:** {} kb/s", bit_rate / 1000);
        }
        let video = media.streams_of(StreamKind::Video).len();
        let audio = media.streams_of(StreamKind::Audio).len();
        if media.streams.is_some() {
            let _ = writeln!(
                block,
                "- **Streams:** {} ({} video, {} audio)",
                format.stream_count, video, audio
            );
        } else {
            let _ = writeln!(block, "- **Streams:** {}", format.stream_count);
        }
        block.push('\n');
    }

    if let Some(ref streams) = media.streams {
        block.push_str("### Streams\n\n");
        block.push_str("| # | Type | Codec | Details |\n");
        block.push_str("|:---:|:---|:---|:---|\n");
        for stream in streams {
            let details = match stream.kind {
                StreamKind::Video => {
                    let mut parts = Vec::new();
                    parts.extend(stream.resolution());
                    parts.extend(stream.frame_rate.map(|fps| format!("{:.3} fps", fps)));
                    parts.extend(stream.pixel_format.clone());
                    parts.join(", ")
                }
                StreamKind::Audio => {
                    let mut parts = Vec::new();
                    parts.extend(stream.sample_rate.map(|hz| format!("{} Hz", hz)));
                    parts.extend(stream.channel_layout.clone());
                    parts.extend(stream.language.clone());
                    parts.join(", ")
                }
                _ => stream.language.clone().unwrap_or_default(),
            };
            let _ = writeln!(
                block,
                "| {} | {} | {} | {} |",
                stream.index, stream.kind, stream.codec_name, details
            );
        }
        block.push('\n');
    }

    if media.loudness.is_some() || media.volume.is_some() {
        block.push_str("### Audio Levels\n\n");
        if let Some(ref loudness) = media.loudness {
            let _ = writeln!(
                block,
                "- **Integrated loudness:** {:.1} LUFS",
                loudness.integrated_lufs
            );
            if let Some(lra) = loudness.loudness_range_lu {
                let _ = writeln!(block, "- **Loudness range:** {:.1} LU", lra);
            }
            if let Some(peak) = loudness.true_peak_dbfs {
                let _ = writeln!(block, "- **True peak:** {:.1} dBFS", peak);
            }
        }
        if let Some(ref volume) = media.volume {
            let _ = writeln!(
                block,
                "- **Mean / max volume:** {:.1} dB / {:.1} dB",
                volume.mean_volume_db, volume.max_volume_db
            );
        }
        block.push('\n');
    }

    if let Some(ref segments) = media.black_segments {
        block.push_str(&generate_segments_block("Black Frames", segments));
    }
    if let Some(ref segments) = media.silence_segments {
        block.push_str(&generate_segments_block("Silence", segments));
    }

    if let Some(ref interlace) = media.interlace {
        block.push_str("### Interlacing\n\n");
        let _ = writeln!(
            block,
            "**{}** (TFF {}, BFF {}, progressive {}, undetermined {})\n",
            interlace.verdict,
            interlace.tff,
            interlace.bff,
            interlace.progressive,
            interlace.undetermined
        );
    }

    block
}

fn generate_segments_block(title: &str, segments: &[Segment]) -> String {
    let mut block = format!("### {}\n\n", title);

    if segments.is_empty() {
        block.push_str("None detected.\n\n");
        return block;
    }

    block.push_str("| Start | End | Duration |\n");
    block.push_str("|:---|:---|---:|\n");
    for segment in segments {
        let end = segment
            .end_secs
            .map(format_timestamp)
            .unwrap_or_else(|| "end of input".to_string());
        let duration = segment
            .duration_secs
            .map(|d| format!("{:.2}s", d))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            block,
            "| {} | {} | {} |",
            format_timestamp(segment.start_secs),
            end,
            duration
        );
    }
    block.push('\n');

    block
}

/// Failed and unfinished probes for one file.
fn generate_warnings_block(run: &RunSummary) -> String {
    if run.warnings.is_empty() {
        return String::new();
    }

    let mut block = String::new();
    block.push_str("### Warnings\n\n");
    block.push_str("| Probe | Kind | Message |\n");
    block.push_str("|:---|:---|:---|\n");
    for warning in &run.warnings {
        let message = warning.message.replace('|', "\\|").replace('\n', " ");
        let _ = writeln!(
            block,
            "| {} | {} | {} |",
            warning.probe, warning.kind, message
        );
    }
    block.push('\n');

    block
}

/// `HH:MM:SS.mmm`.
fn format_timestamp(secs: f64) -> String {
    let millis = (secs.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by mediaprobe*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &BatchReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
