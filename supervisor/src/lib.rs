//! The agent supervisor: configuration resolution, agent loading, the
//! task execution pipeline, and the introspection queries every external
//! interface (CLI, orchestrator, future RPC front end) is built on.
//!
//! Grounded on `agents/core/supervisor/agentd.py`'s `AgentDaemon` for the
//! task pipeline's shape, and on `workflow/src/lib.rs`'s `WorkflowEngine`
//! for this crate's Rust idiom (explicit context struct instead of a
//! process-wide singleton, `#[cfg(test)]` colocated tests).

pub mod config;
pub mod engine;
pub mod error;
pub mod task;
pub mod world;

pub use config::WardenConfig;
pub use engine::{run_skill_call, run_task};
pub use error::{ErrorKind, ErrorRecord};
pub use task::{CapabilityCheck, StepRecord, StepStatus, TaskKind, TaskResult, TaskStatus, parse_task_string};
pub use world::{
    AgentInfo, AgentLoadIssue, AgentLoadReport, AgentSummary, BootstrapError, CapabilityCheckResult,
    NetworkAccessResult, SandboxAccessResult, SharedMemoryError, SupervisorWorld, SystemStatus, ValidateAllReport,
};
