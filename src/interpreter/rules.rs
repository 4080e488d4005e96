//! Deterministic, pattern-based interpretation. Always produces an answer.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Action, CommandInterpreter, CommandKind, Interpretation, QueryKind};
use crate::orchestrator::JobSnapshot;
use crate::params::{MAX_FLOOR_COUNT, ParamKey};
use crate::state_machine::JobStatus;

static FLOORS_BEFORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d+)\s*-?\s*(?:floors?|stor(?:ey|ie|y)s?)\b").expect("valid regex")
});

static FLOORS_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfloors?(?:[\s_]*count)?\s*(?:to|is|=|:|of)?\s*(-?\d+(?:\.\d+)?)\b").expect("valid regex")
});

static THRESHOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:conf_threshold|threshold|confidence|conf)\b\s*(?:to|is|=|:)?\s*(-?\d*\.?\d+)")
        .expect("valid regex")
});

static FLOOR_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:floors?|stor(?:ey|ie|y)s?|levels?)\b").expect("valid regex"));

static THRESHOLD_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:threshold|conf|confidence|conf_threshold)\b").expect("valid regex"));

static INTENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:set|change)\b").expect("valid regex"));

static RETRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:retry|resume|try again)\b").expect("valid regex"));

static START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:start|process)\b").expect("valid regex"));

/// Rule-based interpreter. Rules are checked in priority order:
///
/// 1. status query (answers immediately)
/// 2. floor count update
/// 3. confidence threshold update
/// 4. retry / resume
/// 5. clarification when a value is missing
/// 6. start/process while a job is paused or running
/// 7. guidance while in the error state
/// 8. generic monitoring reply
///
/// Updates from rules 2 and 3 combine with the rules after them.
#[derive(Debug, Default)]
pub struct RuleInterpreter;

impl RuleInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn interpret_now(&self, message: &str, snapshot: &JobSnapshot) -> Interpretation {
        let text = message.to_lowercase();

        if text.contains("status") || text.contains("what is happening") {
            return status_reply(snapshot);
        }

        let mut parts = Vec::new();
        let mut actions = Vec::new();

        let floors = extract_floor_count(&text);
        if let Some(value) = floors {
            match ParamKey::FloorCount.validate(value) {
                Ok(applied) => {
                    parts.push(format!("Setting the floor count to {applied}."));
                    actions.push(Action::UpdateConfig {
                        key: ParamKey::FloorCount.to_string(),
                        value,
                    });
                }
                Err(_) => parts.push(format!(
                    "The floor count must be a whole number between 1 and {MAX_FLOOR_COUNT}; keeping {}.",
                    snapshot.params.floor_count
                )),
            }
        }

        let threshold = THRESHOLD
            .captures(&text)
            .and_then(|c| c[1].parse::<f64>().ok());
        if let Some(value) = threshold {
            match ParamKey::ConfThreshold.validate(value) {
                Ok(applied) => {
                    parts.push(format!("Setting the confidence threshold to {applied}."));
                    actions.push(Action::UpdateConfig {
                        key: ParamKey::ConfThreshold.to_string(),
                        value,
                    });
                }
                Err(_) => parts.push(format!(
                    "The confidence threshold must be between 0 and 1 (exclusive); {value} was rejected and it stays at {}.",
                    snapshot.params.conf_threshold
                )),
            }
        }

        if RETRY.is_match(&text) {
            actions.push(Action::Command(CommandKind::Retry));
            return Interpretation {
                reply: parts.join(" "),
                actions,
            };
        }

        if INTENT.is_match(&text) {
            let mut missing = Vec::new();
            if floors.is_none() && FLOOR_MENTION.is_match(&text) {
                missing.push("how many floors");
            }
            if threshold.is_none() && THRESHOLD_MENTION.is_match(&text) {
                missing.push("which confidence threshold (between 0 and 1)");
            }
            if !missing.is_empty() {
                parts.push(format!("Could you tell me {}?", missing.join(" and ")));
            }
        }

        if let JobStatus::Error(message) = &snapshot.status {
            parts.push(error_guidance(message, snapshot));
        } else if parts.is_empty()
            && let Some(guidance) = start_guidance(&text, &snapshot.status)
        {
            parts.push(guidance);
        }

        if parts.is_empty() {
            parts.push(monitoring_reply(&snapshot.status));
        }

        Interpretation {
            reply: parts.join(" "),
            actions,
        }
    }
}

#[async_trait]
impl CommandInterpreter for RuleInterpreter {
    async fn interpret(&self, message: &str, snapshot: &JobSnapshot) -> Option<Interpretation> {
        Some(self.interpret_now(message, snapshot))
    }
}

fn extract_floor_count(text: &str) -> Option<f64> {
    FLOORS_BEFORE
        .captures(text)
        .or_else(|| FLOORS_AFTER.captures(text))
        .and_then(|c| c[1].parse::<f64>().ok())
}

fn status_reply(snapshot: &JobSnapshot) -> Interpretation {
    let last = snapshot
        .last_log()
        .map(|entry| entry.to_string())
        .unwrap_or_else(|| "(no log entries yet)".to_string());
    Interpretation {
        reply: format!("Current status: {}. Last log: {last}", snapshot.status),
        actions: vec![Action::Query(QueryKind::Status)],
    }
}

// Rule 6: only when nothing else was said.
fn start_guidance(text: &str, status: &JobStatus) -> Option<String> {
    if !START.is_match(text) {
        return None;
    }
    match status {
        JobStatus::Paused(reason) => Some(format!(
            "The last job is paused ({reason}). Do you want me to retry it, or change the configuration first?"
        )),
        JobStatus::Processing => Some("A job is already running. Please wait for it to finish.".to_string()),
        _ => None,
    }
}

// Rule 7: appended to every non-status, non-retry reply while in `Error`.
fn error_guidance(message: &str, snapshot: &JobSnapshot) -> String {
    let last_error = snapshot
        .last_error
        .as_ref()
        .map(|entry| entry.to_string())
        .unwrap_or_else(|| message.to_string());
    format!("The last job failed: {last_error}. Do you want me to retry, or start fresh with a new upload?")
}

pub(super) fn monitoring_reply(status: &JobStatus) -> String {
    format!(
        "I'm monitoring the system (status: {status}). Ask for the status, change the floor count or \
         confidence threshold, or tell me to retry."
    )
}
