//! Model-backed interpretation: the language model writes the reply and may
//! append one fenced JSON block describing a single action.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::time::timeout;

use super::{Action, CommandInterpreter, CommandKind, Interpretation};
use crate::collaborators::TextGenerator;
use crate::orchestrator::JobSnapshot;
use crate::params::ParamKey;

/// How many log lines the prompt includes.
const PROMPT_LOG_LINES: usize = 3;

static ACTION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ModelAction {
    UpdateConfig { key: String, value: serde_json::Value },
    Command { command: String },
}

impl ModelAction {
    /// Converts to an [`Action`], refusing anything that would not validate.
    fn into_action(self) -> Option<Action> {
        match self {
            ModelAction::UpdateConfig { key, value } => {
                let value = match value {
                    serde_json::Value::Number(n) => n.as_f64()?,
                    serde_json::Value::String(s) => s.trim().parse().ok()?,
                    _ => return None,
                };
                let key: ParamKey = key.parse().ok()?;
                key.validate(value).ok()?;
                Some(Action::UpdateConfig {
                    key: key.to_string(),
                    value,
                })
            }
            ModelAction::Command { command } => match command.trim().to_lowercase().as_str() {
                "retry" | "resume" => Some(Action::Command(CommandKind::Retry)),
                _ => None,
            },
        }
    }
}

/// Builds the prompt sent to the language model.
pub fn build_prompt(message: &str, snapshot: &JobSnapshot) -> String {
    let logs = snapshot
        .recent(PROMPT_LOG_LINES)
        .iter()
        .map(|entry| entry.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are the operator assistant of a service that turns 2D construction drawings into 3D IFC models.\n\
         \n\
         Current status: {status}\n\
         Current configuration:\n\
         {config}\n\
         Recent log:\n\
         {logs}\n\
         \n\
         Answer the operator in plain language. If the operator wants a change, append exactly ONE fenced JSON block \
         after your answer, using one of these forms:\n\
         ```json\n\
         {{\"type\": \"update_config\", \"key\": \"<scale|height|floor_count|conf_threshold>\", \"value\": <number>}}\n\
         ```\n\
         ```json\n\
         {{\"type\": \"command\", \"command\": \"retry\"}}\n\
         ```\n\
         conf_threshold must be strictly between 0 and 1; floor_count must be a positive integer.\n\
         \n\
         Operator: {message}",
        status = snapshot.status,
        config = snapshot.params.listing(),
    )
}

/// Splits a model reply into the user-visible text and the first well-formed
/// action block. Returns `None` when no block parses.
pub fn extract_action(text: &str) -> Option<(String, Action)> {
    ACTION_BLOCK.captures_iter(text).find_map(|caps| {
        let action = serde_json::from_str::<ModelAction>(&caps[1]).ok()?.into_action()?;
        let whole = caps.get(0)?;
        let reply = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
        Some((reply.trim().to_string(), action))
    })
}

/// Asks a [`TextGenerator`] for a reply and action.
///
/// Yields `None` (so the next interpreter runs) when the model is unavailable,
/// errors, times out, or returns no parseable action block.
pub struct ModelInterpreter {
    generator: Arc<dyn TextGenerator>,
    deadline: Duration,
}

impl ModelInterpreter {
    pub fn new(generator: Arc<dyn TextGenerator>, deadline: Duration) -> Self {
        Self {
            generator,
            deadline,
        }
    }
}

#[async_trait]
impl CommandInterpreter for ModelInterpreter {
    async fn interpret(&self, message: &str, snapshot: &JobSnapshot) -> Option<Interpretation> {
        let prompt = build_prompt(message, snapshot);
        let text = match timeout(self.deadline, self.generator.generate_text(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!("language model unavailable, using rules: {e}");
                return None;
            }
            Err(_) => {
                tracing::warn!("language model timed out after {:?}, using rules", self.deadline);
                return None;
            }
        };
        match extract_action(&text) {
            Some((reply, action)) => Some(Interpretation {
                reply,
                actions: vec![action],
            }),
            None => {
                tracing::debug!("no usable action block in model reply, using rules");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorError;
    use crate::params::PipelineParams;
    use crate::state_machine::{JobLog, JobStatus, PauseReason};

    struct Canned(Result<String, String>);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate_text(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            self.0.clone().map_err(CollaboratorError::Unavailable)
        }
    }

    struct Hang;

    #[async_trait]
    impl TextGenerator for Hang {
        async fn generate_text(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(String::new())
        }
    }

    fn snapshot() -> JobSnapshot {
        let mut log = JobLog::new();
        for line in ["one", "two", "three", "four"] {
            log.info(line);
        }
        JobSnapshot {
            status: JobStatus::Paused(PauseReason::NoObjectsDetected),
            params: PipelineParams::default(),
            recent_logs: log.recent(10).to_vec(),
            last_error: None,
        }
    }

    async fn run(generator: impl TextGenerator + 'static) -> Option<Interpretation> {
        ModelInterpreter::new(Arc::new(generator), Duration::from_millis(100))
            .interpret("lower the threshold", &snapshot())
            .await
    }

    #[test]
    fn prompt_contains_state_and_last_three_logs() {
        let prompt = build_prompt("hi", &snapshot());
        assert!(prompt.contains("Current status: paused (no_objects_detected)"));
        assert!(prompt.contains("conf_threshold = 0.25"));
        assert!(prompt.contains("[INFO] two"));
        assert!(prompt.contains("[INFO] four"));
        assert!(!prompt.contains("[INFO] one"));
        assert!(prompt.ends_with("Operator: hi"));
    }

    #[test]
    fn extracts_and_strips_block() {
        let text = "Lowering it to 0.1.\n```json\n{\"type\": \"update_config\", \"key\": \"conf_threshold\", \"value\": 0.1}\n```";
        let (reply, action) = extract_action(text).unwrap();
        assert_eq!(reply, "Lowering it to 0.1.");
        assert_eq!(
            action,
            Action::UpdateConfig {
                key: "conf_threshold".into(),
                value: 0.1
            }
        );
    }

    #[test]
    fn skips_malformed_block_and_takes_next() {
        let text = "ok ```{not json}``` then ```json\n{\"type\":\"command\",\"command\":\"retry\"}\n```";
        let (reply, action) = extract_action(text).unwrap();
        assert_eq!(action, Action::Command(CommandKind::Retry));
        assert!(reply.starts_with("ok ```{not json}```"));
    }

    #[test]
    fn string_values_are_accepted() {
        let text = "```json\n{\"type\":\"update_config\",\"key\":\"floor_count\",\"value\":\"4\"}\n```";
        let (_, action) = extract_action(text).unwrap();
        assert_eq!(
            action,
            Action::UpdateConfig {
                key: "floor_count".into(),
                value: 4.0
            }
        );
    }

    #[test]
    fn invalid_actions_are_refused() {
        for block in [
            r#"{"type":"update_config","key":"conf_threshold","value":1.5}"#,
            r#"{"type":"update_config","key":"wall_width","value":0.2}"#,
            r#"{"type":"command","command":"delete_everything"}"#,
        ] {
            assert!(extract_action(&format!("```json\n{block}\n```")).is_none(), "{block}");
        }
    }

    #[tokio::test]
    async fn model_action_is_returned() {
        let out = run(Canned(Ok(
            "Retrying now.\n```json\n{\"type\":\"command\",\"command\":\"retry\"}\n```".into(),
        )))
        .await
        .unwrap();
        assert_eq!(out.reply, "Retrying now.");
        assert_eq!(out.actions, vec![Action::Command(CommandKind::Retry)]);
    }

    #[tokio::test]
    async fn plain_text_reply_falls_back() {
        assert!(run(Canned(Ok("Sure, I can help.".into()))).await.is_none());
    }

    #[tokio::test]
    async fn unavailable_model_falls_back() {
        assert!(run(Canned(Err("no api key".into()))).await.is_none());
    }

    #[tokio::test]
    async fn hung_model_falls_back() {
        assert!(run(Hang).await.is_none());
    }
}
