//! Task strings, step records, and the `TaskResult` every invocation
//! returns (§3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorRecord;

/// The two task-string shapes §4.7 defines. A skill-call form is
/// `<skill>.<function>`, where both halves look like identifiers; anything
/// else is informational.
///
/// Per SPEC_FULL.md §9, any component that produces a task string for
/// [`crate::engine::run_task`] must emit skill-call form — natural-language
/// strings are never decomposed inside this crate. Callers that already
/// have structured input should prefer [`crate::engine::run_skill_call`]
/// over building a string at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    SkillCall { skill: String, function: String },
    Informational(String),
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a task string into its [`TaskKind`] (§4.7's task string grammar).
pub fn parse_task_string(raw: &str) -> TaskKind {
    if let Some((skill, function)) = raw.split_once('.') {
        if !function.contains('.') && is_identifier(skill) && is_identifier(function) {
            return TaskKind::SkillCall {
                skill: skill.to_string(),
                function: function.to_string(),
            };
        }
    }
    TaskKind::Informational(raw.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// A capability check recorded against a step, for audit/diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCheck {
    pub capability: String,
    pub granted: bool,
}

/// One step of the task execution pipeline (§4.7's ten-step table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: u32,
    pub action: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_checks: Vec<CapabilityCheck>,
}

impl StepRecord {
    pub fn start(step_id: u32, action: impl Into<String>) -> Self {
        StepRecord {
            step_id,
            action: action.into(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            capability_checks: Vec::new(),
        }
    }

    pub fn complete(mut self, result: Option<Value>) -> Self {
        self.status = StepStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = result;
        self
    }

    pub fn fail(mut self, error: ErrorRecord) -> Self {
        self.status = StepStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
        self
    }

    pub fn skip(mut self) -> Self {
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn with_capability_check(mut self, capability: impl Into<String>, granted: bool) -> Self {
        self.capability_checks.push(CapabilityCheck {
            capability: capability.into(),
            granted,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
}

/// The structured outcome of every task invocation (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub agent: String,
    pub task: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub result: Value,
    pub logs: std::path::PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
