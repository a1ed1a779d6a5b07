use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Malformed or absent required input. Surfaced to the caller, never retried.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("template definition must be a non-empty list")]
    EmptyTemplates,
    #[error("template definition is malformed: {0}")]
    MalformedTemplates(String),
    #[error("section_id {id} not found")]
    SectionNotFound { id: i64 },
    #[error("artifact {path:?} has unexpected shape: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },
    #[error("unknown info type {0:?}")]
    UnknownLabel(String),
}

/// Soft failure of the external classification call. Recovered inside the
/// classifier by keeping the rule-based result.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("model endpoint returned status {0}")]
    Status(u16),
    #[error("unparsable response: {0}")]
    Parse(String),
    #[error("label {0:?} is not a known info type")]
    InvalidLabel(String),
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}
