//! Media probes and the default registry.
//!
//! Every probe shells out to ffprobe or ffmpeg through [`tool::run_tool`],
//! which ties the subprocess to the probe's [`RunContext`].

pub mod detect;
pub mod ffmpeg;
pub mod ffprobe;
pub mod interlace;
pub mod loudness;
pub mod tool;
pub mod volume;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::{fields, MediaReport};
use crate::orchestrator::{Mutator, Probe, ProbeFn, Registry, RunContext};

pub const FORMAT: &str = "format";
pub const STREAMS: &str = "streams";
pub const LOUDNESS: &str = "loudness";
pub const VOLUME: &str = "volume";
pub const BLACK: &str = "black";
pub const SILENCE: &str = "silence";
pub const INTERLACE: &str = "interlace";

/// All probe names, in registry order.
pub const PROBE_NAMES: &[&str] = &[FORMAT, STREAMS, LOUDNESS, VOLUME, BLACK, SILENCE, INTERLACE];

/// Input shared by every probe of one run.
#[derive(Debug, Clone)]
pub struct MediaInput {
    pub path: PathBuf,
}

impl MediaInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// External tools and analysis settings.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ffprobe: String,
    pub ffmpeg: String,
    /// Analyse only the first N seconds with ffmpeg filters.
    pub analysis_seconds: Option<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            analysis_seconds: None,
        }
    }
}

/// Registry with every media probe.
pub fn default_registry(tools: Arc<ToolConfig>) -> Registry<MediaInput, MediaReport> {
    Registry::new()
        .with(tool_probe(FORMAT, fields::FORMAT, &tools, ffprobe::probe_format))
        .with(tool_probe(STREAMS, fields::STREAMS, &tools, ffprobe::probe_streams))
        .with(tool_probe(LOUDNESS, fields::LOUDNESS, &tools, loudness::probe_loudness))
        .with(tool_probe(VOLUME, fields::VOLUME, &tools, volume::probe_volume))
        .with(tool_probe(BLACK, fields::BLACK_SEGMENTS, &tools, detect::probe_black))
        .with(tool_probe(SILENCE, fields::SILENCE_SEGMENTS, &tools, detect::probe_silence))
        .with(tool_probe(INTERLACE, fields::INTERLACE, &tools, interlace::probe_interlace))
}

/// Binds a probe function to the shared tool settings.
fn tool_probe<F, Fut>(
    name: &'static str,
    field: &'static str,
    tools: &Arc<ToolConfig>,
    run: F,
) -> impl Probe<MediaInput, MediaReport>
where
    F: Fn(RunContext, Arc<MediaInput>, Arc<ToolConfig>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Mutator<MediaReport>>> + Send + 'static,
{
    let tools = Arc::clone(tools);
    ProbeFn::new(
        name,
        [field],
        move |ctx: RunContext, input: Arc<MediaInput>| run(ctx, input, Arc::clone(&tools)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = default_registry(Arc::new(ToolConfig::default()));
        assert_eq!(registry.len(), PROBE_NAMES.len());
        assert_eq!(registry.names(), PROBE_NAMES.to_vec());
        registry.validate().unwrap();
    }

    #[test]
    fn test_select_subset() {
        let registry = default_registry(Arc::new(ToolConfig::default()));
        let selected = registry.select(&["volume", "format"]).unwrap();
        assert_eq!(selected.len(), 2);
        selected.validate().unwrap();
    }

    #[test]
    fn test_select_unknown_probe() {
        let registry = default_registry(Arc::new(ToolConfig::default()));
        let err = registry.select(&["loudness", "sharpness"]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownProbe {
                name: "sharpness".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_tool_fails_probe() {
        use crate::orchestrator::{Orchestrator, OrchestratorConfig};
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        let tools = Arc::new(ToolConfig {
            ffprobe: "/nonexistent/ffprobe".to_string(),
            ffmpeg: "/nonexistent/ffmpeg".to_string(),
            analysis_seconds: None,
        });
        let registry = default_registry(tools);
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            deadline: Duration::from_secs(5),
            ..Default::default()
        });

        let result = tokio_test::assert_ok!(
            orchestrator
                .run(
                    Arc::new(MediaInput::new("clip.mp4")),
                    &registry,
                    &CancellationToken::new(),
                )
                .await
        );

        assert!(result.summary.outcome.is_complete());
        assert_eq!(result.summary.failed.len(), PROBE_NAMES.len());
        assert!(result.data.format.is_none());
        assert!(result.data.interlace.is_none());
    }
}
