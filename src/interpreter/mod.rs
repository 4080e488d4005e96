//! Turns free-form operator text into control actions on the orchestrator.
//!
//! Interpretation and application are separate steps. A [`CommandInterpreter`]
//! reads the message and a [`JobSnapshot`] and proposes a reply plus a list of
//! [`Action`]s; the [`ChatController`] then applies those actions through the
//! orchestrator's public entry points. Both the rule-based and the model-backed
//! interpreters go through the same controller, so equivalent actions have
//! identical effects.

mod llm;
mod rules;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::orchestrator::{JobResult, JobSnapshot, WorkflowOrchestrator};
use crate::params::ParamValue;
use crate::state_machine::JobStatus;

pub use llm::ModelInterpreter;
pub use rules::RuleInterpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Status,
}

/// A structured instruction derived from operator text.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    UpdateConfig { key: String, value: f64 },
    Command(CommandKind),
    Query(QueryKind),
}

/// A proposed reply and the actions to apply, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interpretation {
    pub reply: String,
    pub actions: Vec<Action>,
}

/// `(message, state) -> (reply, [Action])`.
///
/// Returning `None` means "not understood", letting a [`FallbackChain`] try the
/// next interpreter.
#[async_trait]
pub trait CommandInterpreter: Send + Sync {
    async fn interpret(&self, message: &str, snapshot: &JobSnapshot) -> Option<Interpretation>;
}

/// Tries each interpreter in turn and returns the first answer.
pub struct FallbackChain {
    interpreters: Vec<Box<dyn CommandInterpreter>>,
}

impl FallbackChain {
    pub fn new(interpreters: Vec<Box<dyn CommandInterpreter>>) -> Self {
        Self { interpreters }
    }
}

#[async_trait]
impl CommandInterpreter for FallbackChain {
    async fn interpret(&self, message: &str, snapshot: &JobSnapshot) -> Option<Interpretation> {
        for interpreter in &self.interpreters {
            if let Some(found) = interpreter.interpret(message, snapshot).await {
                return Some(found);
            }
        }
        None
    }
}

/// Reply sent back to the chat client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    /// Parameters actually changed by this message.
    pub updated_params: BTreeMap<String, ParamValue>,
}

/// Interprets chat messages and applies the resulting actions.
#[derive(Clone)]
pub struct ChatController {
    orchestrator: WorkflowOrchestrator,
    interpreter: Arc<dyn CommandInterpreter>,
}

impl ChatController {
    pub fn new(orchestrator: WorkflowOrchestrator, interpreter: Arc<dyn CommandInterpreter>) -> Self {
        Self {
            orchestrator,
            interpreter,
        }
    }

    pub async fn handle(&self, message: &str) -> ChatReply {
        let snapshot = self.orchestrator.snapshot().await;
        let interpretation = match self.interpreter.interpret(message, &snapshot).await {
            Some(found) => found,
            None => Interpretation {
                reply: rules::monitoring_reply(&snapshot.status),
                actions: Vec::new(),
            },
        };
        tracing::debug!(actions = ?interpretation.actions, "chat message interpreted");
        self.apply(interpretation).await
    }

    async fn apply(&self, interpretation: Interpretation) -> ChatReply {
        let mut parts = Vec::new();
        if !interpretation.reply.trim().is_empty() {
            parts.push(interpretation.reply.trim().to_string());
        }
        let mut updated_params = BTreeMap::new();

        for action in interpretation.actions {
            match action {
                Action::UpdateConfig { key, value } => {
                    // The orchestrator logs the rejection; nothing is applied.
                    if let Ok((key, applied)) = self.orchestrator.update_config(&key, value).await {
                        updated_params.insert(key.to_string(), applied);
                    }
                }
                Action::Command(CommandKind::Retry) => parts.push(self.retry().await),
                Action::Query(QueryKind::Status) => {}
            }
        }

        ChatReply {
            reply: parts.join(" "),
            updated_params,
        }
    }

    async fn retry(&self) -> String {
        let status = self.orchestrator.status().await;
        if !matches!(status, JobStatus::Paused(_) | JobStatus::Error(_)) {
            return format!("There is nothing to resume right now (status: {status}).");
        }
        let outcome = match self.orchestrator.resume().await {
            Ok(result) => result,
            Err(e) => JobResult::from(e),
        };
        let detail = match outcome {
            JobResult::Success {
                detection_count,
                download_url,
                ..
            } => format!("Job completed with {detection_count} detections. Download: {download_url}"),
            JobResult::Paused { reason, message, .. } => format!("Still paused ({reason}): {message}"),
            JobResult::Error { message } => format!("The retry failed: {message}"),
            JobResult::Busy { message } => message,
        };
        format!("Retrying the last job with the current configuration. {detail}")
    }
}
