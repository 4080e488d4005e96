use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::collaborators::CollaboratorError;

/// Startup failures: configuration and collaborator wiring.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("Collaborator setup error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Rejections raised at the pipeline-parameter validation boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown config key `{0}` (expected scale, height, floor_count or conf_threshold)")]
    UnknownConfigKey(String),

    #[error("invalid value {value} for `{key}`: {reason}")]
    InvalidConfigValue {
        key: String,
        value: f64,
        reason: &'static str,
    },
}

/// Which collaborator a pipeline step was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Detection,
    Generation,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Detection => write!(f, "detection"),
            Step::Generation => write!(f, "generation"),
        }
    }
}

/// Failures of the job-control entry points and of the pipeline itself.
///
/// `NoJobContext`, `Busy` and `Upload` are returned to the caller as `Err`.
/// The remaining variants are caught inside a run and reported as
/// [`JobResult::Error`](crate::orchestrator::JobResult::Error).
#[derive(Debug, Error)]
pub enum JobError {
    #[error("No job context to resume.")]
    NoJobContext,

    #[error("A job is already running. Wait for it to finish before submitting another.")]
    Busy,

    #[error("Failed to store upload: {0}")]
    Upload(#[from] std::io::Error),

    #[error("Invalid override: {0}")]
    InvalidOverride(#[from] ParamError),

    #[error("Detection failed: {0}")]
    DetectionFailure(String),

    #[error("Model generation failed: {0}")]
    GenerationFailure(String),

    #[error("{step} did not answer within {secs}s")]
    CollaboratorTimeout { step: Step, secs: u64 },
}
