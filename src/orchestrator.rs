use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

use crate::collaborators::{CollaboratorError, Detector, ModelGenerator};
use crate::error::{JobError, ParamError, Step};
use crate::params::{ParamKey, ParamOverrides, ParamValue, PipelineParams};
use crate::placement::place_elements;
use crate::state_machine::{Event, JobContext, JobLog, JobStatus, LogEntry, LogLevel, PauseReason, StateMachine};

/// How many log lines a [`JobSnapshot`] carries.
const SNAPSHOT_LOG_LINES: usize = 10;

/// Outcome of a submit or resume, reported to the caller exactly once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success {
        #[serde(rename = "jobId")]
        job_id: String,
        #[serde(rename = "detections")]
        detection_count: usize,
        #[serde(rename = "ifcUrl")]
        download_url: String,
    },
    Paused {
        reason: PauseReason,
        #[serde(rename = "jobId")]
        job_id: String,
        message: String,
    },
    Error {
        message: String,
    },
    Busy {
        message: String,
    },
}

impl From<JobError> for JobResult {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Busy => JobResult::Busy {
                message: err.to_string(),
            },
            other => JobResult::Error {
                message: other.to_string(),
            },
        }
    }
}

/// An uploaded drawing.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Filesystem and policy settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub collaborator_timeout: Duration,
    pub retain_error_state: bool,
}

/// Read-only view of the job state, handed to the chat interpreter.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub params: PipelineParams,
    /// The most recent log lines, oldest first.
    pub recent_logs: Vec<LogEntry>,
    pub last_error: Option<LogEntry>,
}

impl JobSnapshot {
    pub fn last_log(&self) -> Option<&LogEntry> {
        self.recent_logs.last()
    }

    pub fn recent(&self, n: usize) -> &[LogEntry] {
        let start = self.recent_logs.len().saturating_sub(n);
        &self.recent_logs[start..]
    }
}

struct JobState {
    status: JobStatus,
    params: PipelineParams,
    context: Option<JobContext>,
    log: JobLog,
}

struct Inner {
    state: Mutex<JobState>,
    detector: Arc<dyn Detector>,
    generator: Arc<dyn ModelGenerator>,
    settings: OrchestratorSettings,
    machine: StateMachine,
}

/// Single-job workflow orchestrator: owns the lifecycle status, the pipeline
/// parameters, the retry context and the job log.
///
/// Cloning is cheap; clones share the same state. Only one run may be in
/// flight: a submit or resume while `Processing` is rejected with
/// [`JobError::Busy`].
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    inner: Arc<Inner>,
}

impl WorkflowOrchestrator {
    pub fn new(
        detector: Arc<dyn Detector>,
        generator: Arc<dyn ModelGenerator>,
        settings: OrchestratorSettings,
        params: PipelineParams,
    ) -> Self {
        let mut log = JobLog::new();
        log.info("System initialized.");
        let machine = StateMachine::new(settings.retain_error_state);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(JobState {
                    status: JobStatus::Idle,
                    params,
                    context: None,
                    log,
                }),
                detector,
                generator,
                settings,
                machine,
            }),
        }
    }

    /// Stores the upload, records it as the retry context and runs the pipeline.
    ///
    /// `overrides` apply to this run only and are never written back.
    pub async fn submit(&self, upload: Upload, overrides: &ParamOverrides) -> Result<JobResult, JobError> {
        let job_id = Uuid::new_v4().to_string();
        let params = {
            let mut state = self.inner.state.lock().await;
            self.inner.begin(&mut state, format!("Job {job_id} submitted ({}).", upload.filename))?;
            state.params.with_overrides(overrides)
        };

        let filename = sanitize_filename(&upload.filename);
        let source_path = self.inner.settings.upload_dir.join(format!("{job_id}_{filename}"));
        if let Err(e) = store_upload(&source_path, &upload.bytes).await {
            // The previous context belongs to another drawing; a retry must not
            // pick it up in place of the one that just failed.
            self.inner.state.lock().await.context = None;
            self.inner
                .finish(Event::Failed(e.to_string()), LogLevel::Error, format!("Error: could not store upload: {e}"))
                .await;
            return Err(JobError::Upload(e));
        }

        let context = JobContext {
            source_path,
            job_id,
            original_filename: upload.filename,
        };
        {
            let mut state = self.inner.state.lock().await;
            state.log.info(format!("File saved: {}", context.source_path.display()));
            state.context = Some(context.clone());
        }

        Ok(self.spawn_run(context, params).await)
    }

    /// Re-runs the whole pipeline for the last submitted job with the current
    /// parameters. Detection runs again, so a changed threshold can change the
    /// outcome.
    pub async fn resume(&self) -> Result<JobResult, JobError> {
        let (context, params) = {
            let mut state = self.inner.state.lock().await;
            let Some(context) = state.context.clone() else {
                state.log.error("No job context to resume.");
                return Err(JobError::NoJobContext);
            };
            self.inner.begin(
                &mut state,
                format!("Resuming job {} with updated configuration...", context.job_id),
            )?;
            (context, state.params)
        };

        Ok(self.spawn_run(context, params).await)
    }

    /// Validates and applies a persistent parameter update.
    pub async fn update_config(&self, key: &str, value: f64) -> Result<(ParamKey, ParamValue), ParamError> {
        let mut state = self.inner.state.lock().await;
        match state.params.update(key, value) {
            Ok((key, applied)) => {
                state.log.info(format!("Config updated: {key} = {applied}"));
                Ok((key, applied))
            }
            Err(e) => {
                state.log.warn(format!("Config update rejected: {e}"));
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> JobStatus {
        self.inner.state.lock().await.status.clone()
    }

    pub async fn params(&self) -> PipelineParams {
        self.inner.state.lock().await.params
    }

    pub async fn context(&self) -> Option<JobContext> {
        self.inner.state.lock().await.context.clone()
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let state = self.inner.state.lock().await;
        JobSnapshot {
            status: state.status.clone(),
            params: state.params,
            recent_logs: state.log.recent(SNAPSHOT_LOG_LINES).to_vec(),
            last_error: state.log.last_error().cloned(),
        }
    }

    /// Every log entry so far, oldest first.
    pub async fn logs(&self) -> Vec<LogEntry> {
        let state = self.inner.state.lock().await;
        state.log.recent(state.log.len()).to_vec()
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.settings.output_dir
    }

    // The run happens on its own task so that a dropped caller cannot cancel it
    // halfway and leave the status stuck in `Processing`.
    async fn spawn_run(&self, context: JobContext, params: PipelineParams) -> JobResult {
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.run(&context, &params).await }).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("pipeline task aborted: {e}");
                self.inner
                    .finish(Event::Failed(message.clone()), LogLevel::Error, format!("Error: {message}"))
                    .await;
                JobResult::Error { message }
            }
        }
    }
}

impl Inner {
    /// Moves the status to `Processing`, or reports `Busy`.
    fn begin(&self, state: &mut JobState, message: String) -> Result<(), JobError> {
        match self.machine.next(&state.status, Event::Start) {
            Ok(next) => {
                state.status = next;
                state.log.info(message);
                Ok(())
            }
            Err(_) => {
                state.log.warn("Rejected request: a job is already processing.");
                Err(JobError::Busy)
            }
        }
    }

    /// Applies the run's final event, logs it, then settles the persisted status.
    async fn finish(&self, event: Event, level: LogLevel, message: String) {
        let mut state = self.state.lock().await;
        match self.machine.next(&state.status, event) {
            Ok(reported) => {
                state.log.push(level, message);
                state.status = self.machine.settle(reported);
            }
            Err(e) => tracing::error!("job state out of sync: {e}"),
        }
    }

    async fn log(&self, level: LogLevel, message: String) {
        self.state.lock().await.log.push(level, message);
    }

    async fn call<T>(
        &self,
        step: Step,
        fut: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, JobError> {
        let limit = self.settings.collaborator_timeout;
        match timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(match step {
                Step::Detection => JobError::DetectionFailure(e.to_string()),
                Step::Generation => JobError::GenerationFailure(e.to_string()),
            }),
            Err(_) => Err(JobError::CollaboratorTimeout {
                step,
                secs: limit.as_secs(),
            }),
        }
    }

    async fn run(&self, context: &JobContext, params: &PipelineParams) -> JobResult {
        match self.pipeline(context, params).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                self.finish(Event::Failed(message.clone()), LogLevel::Error, format!("Error: {message}"))
                    .await;
                JobResult::Error { message }
            }
        }
    }

    async fn pipeline(&self, context: &JobContext, params: &PipelineParams) -> Result<JobResult, JobError> {
        self.log(
            LogLevel::Info,
            format!("Starting object detection with conf={}...", params.conf_threshold),
        )
        .await;
        let report = self
            .call(
                Step::Detection,
                self.detector.detect(&context.source_path, params.conf_threshold),
            )
            .await?;

        if report.count == 0 {
            let reason = PauseReason::NoObjectsDetected;
            self.finish(
                Event::NothingDetected,
                LogLevel::Warn,
                "Warning: No objects detected. Pausing for agent intervention.".to_string(),
            )
            .await;
            return Ok(JobResult::Paused {
                reason,
                job_id: context.job_id.clone(),
                message: reason.message().to_string(),
            });
        }

        let elements = place_elements(&report.detections, params);
        let output_filename = format!("{}.ifc", context.job_id);
        let output_path = self.settings.output_dir.join(&output_filename);
        self.log(
            LogLevel::Info,
            format!(
                "Detected {} objects. Generating IFC model with {} elements...",
                report.count,
                elements.len()
            ),
        )
        .await;
        let project = format!("Project_{}", context.job_id);
        self.call(
            Step::Generation,
            self.generator.generate(&project, &elements, &output_path),
        )
        .await?;

        self.finish(
            Event::Finished,
            LogLevel::Info,
            format!("Job completed. Output: {output_filename}"),
        )
        .await;
        Ok(JobResult::Success {
            job_id: context.job_id.clone(),
            detection_count: report.count,
            download_url: format!("/download/{output_filename}"),
        })
    }
}

async fn store_upload(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// Keeps only the final path component of a client-supplied filename.
fn sanitize_filename(name: &str) -> String {
    match name.rsplit(['/', '\\']).next().map(str::trim) {
        Some(base) if !base.is_empty() && base != "." && base != ".." => base.to_string(),
        _ => "upload".to_string(),
    }
}
