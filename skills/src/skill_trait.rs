//! The `Skill` trait skills implement, and the outcome shape `call`
//! produces (§4.6, `agents/skills/base.py`'s `Skill`/`SkillResult`).

use std::cell::RefCell;
use std::time::Instant;

use serde_json::Value;

use warden_executor::GatedExecutor;
use warden_memory::AgentMemory;
use warden_sandbox::Sandbox;

/// Per-call log buffer. Cleared at the start of every [`Skill::call`],
/// mirroring the source's `clear_logs()`-then-accumulate pattern.
#[derive(Default)]
pub struct CallLog {
    entries: RefCell<Vec<String>>,
}

impl CallLog {
    pub fn log(&self, message: impl Into<String>) {
        self.entries.borrow_mut().push(message.into());
    }

    fn into_entries(self) -> Vec<String> {
        self.entries.into_inner()
    }
}

/// The result of one skill function call.
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub duration_ms: u64,
}

/// The agent-scoped handles a skill is built with: its gated executor,
/// its sandbox, and its memory store. Borrowed for the skill's lifetime
/// rather than owned, since all three outlive any single task.
pub struct SkillContext<'a> {
    pub executor: &'a GatedExecutor,
    pub sandbox: &'a Sandbox,
    pub memory: &'a AgentMemory,
}

/// A modular agent capability exposing one or more named functions.
///
/// Implementors dispatch by name in [`Skill::invoke`] rather than handing
/// back a map of closures: the source's `get_functions() -> Dict[str,
/// callable]` doesn't translate directly into a trait object-safe Rust
/// signature, so a `match` on `function_name` plays the same role.
pub trait Skill {
    fn name(&self) -> &'static str;

    /// The function names this skill provides, for manifest cross-checks
    /// and the "unknown function" error path in [`Skill::call`].
    fn functions(&self) -> &'static [&'static str];

    /// Run one named function with `args`, logging through `log` as it
    /// goes. `Err` becomes the outcome's `error` field.
    fn invoke(&self, function_name: &str, args: Value, log: &CallLog) -> Result<Value, String>;

    /// Call a function by name, producing a timed, logged [`SkillOutcome`]
    /// instead of propagating a `Result` — skills report failure as data,
    /// not as a Rust error, matching `base.py`'s `call()` contract.
    fn call(&self, function_name: &str, args: Value) -> SkillOutcome {
        if !self.functions().contains(&function_name) {
            return SkillOutcome {
                success: false,
                data: Value::Null,
                error: Some(format!(
                    "unknown function: {function_name}. available: {:?}",
                    self.functions()
                )),
                logs: Vec::new(),
                duration_ms: 0,
            };
        }

        let log = CallLog::default();
        let start = Instant::now();
        match self.invoke(function_name, args, &log) {
            Ok(data) => SkillOutcome {
                success: true,
                data,
                error: None,
                logs: log.into_entries(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(error) => {
                log.log(format!("ERROR: {error}"));
                SkillOutcome {
                    success: false,
                    data: Value::Null,
                    error: Some(error),
                    logs: log.into_entries(),
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }
}
