//! Error types for the probe orchestrator and its probes.
//!
//! - [`RegistryError`]: the batch cannot start at all. This is the only error
//!   the orchestrator returns to its caller.
//! - [`ProbeError`]: one probe failed. Contained by the aggregator, logged and
//!   recorded as a warning, never propagated as a call failure.
//! - [`ToolError`]: an external tool invocation failed inside a probe.

use std::time::Duration;
use thiserror::Error;

/// Errors that prevent an orchestration run from starting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No probes were registered.
    #[error("probe registry is empty")]
    Empty,

    /// A probe was registered with a blank name.
    #[error("probe at position {index} has an empty name")]
    BlankName { index: usize },

    /// Two probes share the same name.
    #[error("probe name '{name}' is registered more than once")]
    DuplicateName { name: String },

    /// Two probes claim the same field of the composite result.
    #[error("field '{field}' is claimed by both '{first}' and '{second}'")]
    OverlappingField {
        field: String,
        first: String,
        second: String,
    },

    /// A probe name requested for selection is not in the registry.
    #[error("unknown probe '{name}'")]
    UnknownProbe { name: String },

    /// The batch deadline is zero.
    #[error("run deadline must be greater than zero")]
    ZeroDeadline,
}

impl RegistryError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Empty => "registry_empty",
            RegistryError::BlankName { .. } => "registry_blank_name",
            RegistryError::DuplicateName { .. } => "registry_duplicate_name",
            RegistryError::OverlappingField { .. } => "registry_overlapping_field",
            RegistryError::UnknownProbe { .. } => "registry_unknown_probe",
            RegistryError::ZeroDeadline => "registry_zero_deadline",
        }
    }
}

/// A failure of a single probe, tagged with the probe's name.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe returned an error.
    #[error("probe '{probe}' failed: {source:#}")]
    Failed {
        probe: String,
        #[source]
        source: anyhow::Error,
    },

    /// The probe exceeded its individual timeout.
    #[error("probe '{probe}' timed out after {timeout:?}")]
    TimedOut { probe: String, timeout: Duration },

    /// The probe task panicked.
    #[error("probe '{probe}' panicked: {message}")]
    Panicked { probe: String, message: String },

    /// The probe sent a second mutator in the same run.
    #[error("probe '{probe}' produced more than one result")]
    DuplicateResult { probe: String },

    /// The probe task ended without reporting a result or an error.
    #[error("probe '{probe}' exited without reporting")]
    Lost { probe: String },
}

impl ProbeError {
    /// Name of the probe this error belongs to.
    pub fn probe(&self) -> &str {
        match self {
            ProbeError::Failed { probe, .. }
            | ProbeError::TimedOut { probe, .. }
            | ProbeError::Panicked { probe, .. }
            | ProbeError::DuplicateResult { probe }
            | ProbeError::Lost { probe } => probe,
        }
    }

    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Failed { .. } => "probe_failed",
            ProbeError::TimedOut { .. } => "probe_timeout",
            ProbeError::Panicked { .. } => "probe_panicked",
            ProbeError::DuplicateResult { .. } => "probe_duplicate_result",
            ProbeError::Lost { .. } => "probe_lost",
        }
    }
}

/// Errors from running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool could not be started (missing binary, permissions).
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    /// The run context was canceled while the tool was running.
    #[error("{program} was canceled")]
    Cancelled { program: String },
}
