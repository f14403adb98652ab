//! The closed nine-kind error taxonomy (§3 Error Record, §7).
//!
//! Every error raised inside a task — a capability check, a sandbox
//! containment failure, a missing skill, an uncaught skill exception — is
//! converted into one of these kinds by the task engine before it crosses
//! into a [`crate::task::TaskResult`]. No other error type crosses that
//! boundary, matching SPEC_FULL.md §7's "ambient error-handling stack" note
//! that each crate keeps its own `thiserror` enum internally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed taxonomy. Adding a tenth kind is a breaking change of the
/// external interface (§7) — new conditions map into one of these instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CapabilityDenied,
    SkillNotAllowed,
    SkillMissing,
    InvalidPath,
    SandboxViolation,
    ExecutionError,
    MemoryError,
    NetworkViolation,
    UnknownError,
}

/// A structured error record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_type: ErrorKind,
    pub message: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, agent: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorRecord {
            error_type: kind,
            message: message.into(),
            agent: agent.into(),
            required: None,
            details: None,
        }
    }

    pub fn with_required(mut self, required: impl Into<String>) -> Self {
        self.required = Some(required.into());
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unknown(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, agent, message)
    }
}
