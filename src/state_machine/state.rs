use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a job stopped and is waiting for operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    NoObjectsDetected,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::NoObjectsDetected => "no_objects_detected",
        }
    }

    /// Operator-facing explanation of the pause.
    pub fn message(&self) -> &'static str {
        match self {
            PauseReason::NoObjectsDetected => {
                "No objects were detected. Please check the image or adjust parameters (e.g. threshold)."
            }
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide job lifecycle status. Exactly one value at any time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Processing,
    Paused(PauseReason),
    Error(String),
    Completed,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Processing => "processing",
            JobStatus::Paused(_) => "paused",
            JobStatus::Error(_) => "error",
            JobStatus::Completed => "completed",
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, JobStatus::Paused(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Paused(reason) => write!(f, "paused ({reason})"),
            JobStatus::Error(message) => write!(f, "error ({message})"),
            other => f.write_str(other.label()),
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Something that happened to the running job.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A submit or resume starts the pipeline.
    Start,
    /// Detection returned zero objects.
    NothingDetected,
    /// A collaborator failed or timed out.
    Failed(String),
    /// The model file was produced.
    Finished,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::NothingDetected => "nothing_detected",
            Event::Failed(_) => "failed",
            Event::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply `{event}` while {from}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub event: &'static str,
}

/// Transition rules for [`JobStatus`].
///
/// `Completed` is always reported once and then settles back to `Idle`.
/// `Error` does the same unless `retain_error_state` is set, in which case it
/// stays visible until the next run starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMachine {
    pub retain_error_state: bool,
}

impl StateMachine {
    pub fn new(retain_error_state: bool) -> Self {
        Self { retain_error_state }
    }

    /// Compute the status reached by applying `event` to `current`.
    pub fn next(&self, current: &JobStatus, event: Event) -> Result<JobStatus, TransitionError> {
        let next = match (current, &event) {
            (JobStatus::Processing, Event::Start) => None,
            (_, Event::Start) => Some(JobStatus::Processing),
            (JobStatus::Processing, Event::NothingDetected) => {
                Some(JobStatus::Paused(PauseReason::NoObjectsDetected))
            }
            (JobStatus::Processing, Event::Failed(message)) => Some(JobStatus::Error(message.clone())),
            (JobStatus::Processing, Event::Finished) => Some(JobStatus::Completed),
            _ => None,
        };
        next.ok_or_else(|| TransitionError {
            from: current.clone(),
            event: event.name(),
        })
    }

    /// The status persisted once a run's outcome has been reported.
    pub fn settle(&self, reported: JobStatus) -> JobStatus {
        match reported {
            JobStatus::Completed => JobStatus::Idle,
            JobStatus::Error(_) if !self.retain_error_state => JobStatus::Idle,
            other => other,
        }
    }
}
