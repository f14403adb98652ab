//! The task execution pipeline (§4.7's ten-step table).

use serde_json::Value;
use uuid::Uuid;

use warden_capability::difference;
use warden_executor::GatedExecutor;
use warden_sandbox::SandboxError;

use crate::error::{ErrorKind, ErrorRecord};
use crate::task::{StepRecord, TaskKind, TaskResult, TaskStatus, parse_task_string};
use crate::world::SupervisorWorld;

/// Run a task string against `agent_name` (§4.7).
///
/// Accepts either skill-call form (`<skill>.<function>`) or a
/// natural-language string; the latter short-circuits into an
/// informational reply without running any pipeline step beyond agent
/// lookup (§4.7's task string grammar).
pub fn run_task(world: &SupervisorWorld, agent_name: &str, task: &str, args: Value) -> TaskResult {
    match parse_task_string(task) {
        TaskKind::SkillCall { skill, function } => {
            run_pipeline(world, agent_name, task, &skill, &function, args)
        }
        TaskKind::Informational(text) => informational_reply(world, agent_name, &text),
    }
}

/// Run a task already known to be a skill call, bypassing task-string
/// parsing (§4.7 supplement's typed entry point).
pub fn run_skill_call(
    world: &SupervisorWorld,
    agent_name: &str,
    skill: &str,
    function: &str,
    args: Value,
) -> TaskResult {
    let task = format!("{skill}.{function}");
    run_pipeline(world, agent_name, &task, skill, function, args)
}

fn informational_reply(world: &SupervisorWorld, agent_name: &str, text: &str) -> TaskResult {
    let started_at = chrono::Utc::now();
    let task_id = Uuid::new_v4().to_string();
    let logs = world.config.logs_dir.join(format!("{agent_name}.log"));

    let Some(agent) = world.get_agent(agent_name) else {
        let error = ErrorRecord::new(ErrorKind::UnknownError, agent_name, "unknown agent");
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: text.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps: Vec::new(),
            result: Value::Null,
            logs,
            error: Some(error),
        };
    };

    let reply = serde_json::json!({
        "message": "this looks like a natural-language task; no interpretation is performed here",
        "available_skills": agent.skills,
        "example_invocations": agent.skills.iter()
            .map(|skill| format!("{skill}.<function>"))
            .collect::<Vec<_>>(),
    });

    TaskResult {
        status: TaskStatus::Success,
        agent: agent_name.to_string(),
        task: text.to_string(),
        task_id,
        started_at,
        completed_at: chrono::Utc::now(),
        steps: Vec::new(),
        result: reply,
        logs,
        error: None,
    }
}

fn run_pipeline(
    world: &SupervisorWorld,
    agent_name: &str,
    task: &str,
    skill_name: &str,
    function: &str,
    args: Value,
) -> TaskResult {
    let started_at = chrono::Utc::now();
    let task_id = Uuid::new_v4().to_string();
    let mut steps = Vec::new();
    let logs_path = world.config.logs_dir.join(format!("{agent_name}.log"));

    macro_rules! fail {
        ($kind:expr, $message:expr) => {{
            let error = ErrorRecord::new($kind, agent_name, $message);
            return TaskResult {
                status: TaskStatus::Error,
                agent: agent_name.to_string(),
                task: task.to_string(),
                task_id,
                started_at,
                completed_at: chrono::Utc::now(),
                steps,
                result: Value::Null,
                logs: logs_path,
                error: Some(error),
            };
        }};
    }

    // Step 1: lookup agent, log task start.
    let mut step1 = StepRecord::start(1, "lookup_agent");
    let Some(agent) = world.get_agent(agent_name) else {
        step1 = step1.fail(ErrorRecord::new(ErrorKind::UnknownError, agent_name, "unknown agent"));
        steps.push(step1);
        fail!(ErrorKind::UnknownError, "unknown agent");
    };
    steps.push(step1.complete(None));

    let log = match world.open_log(&agent) {
        Ok(log) => log,
        Err(err) => fail!(ErrorKind::UnknownError, format!("failed to open log: {err}")),
    };
    let _ = log.append("run_task", "started", Some(serde_json::json!({ "task_id": task_id, "task": task })));

    // Step 2: scrub process-wide proxy environment (offline guarantee, §5).
    let step2 = StepRecord::start(2, "scrub_proxy_env");
    scrub_proxy_env();
    steps.push(step2.complete(None));

    // Step 3: open memory, check budget.
    let step3 = StepRecord::start(3, "open_memory");
    let memory = match world.open_memory(&agent) {
        Ok(memory) => memory,
        Err(err) => {
            steps.push(step3.fail(ErrorRecord::new(ErrorKind::MemoryError, agent_name, err.to_string())));
            let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
            return TaskResult {
                status: TaskStatus::Error,
                agent: agent_name.to_string(),
                task: task.to_string(),
                task_id,
                started_at,
                completed_at: chrono::Utc::now(),
                steps,
                result: Value::Null,
                logs: logs_path,
                error: Some(ErrorRecord::new(ErrorKind::MemoryError, agent_name, err.to_string())),
            };
        }
    };
    if let Err(err) = memory.check_budget() {
        steps.push(step3.fail(ErrorRecord::new(ErrorKind::MemoryError, agent_name, err.to_string())));
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(ErrorRecord::new(ErrorKind::MemoryError, agent_name, err.to_string())),
        };
    }
    steps.push(step3.complete(None));

    // Step 4: materialize sandbox.
    let step4 = StepRecord::start(4, "materialize_sandbox");
    let sandbox = match world.open_sandbox(&agent) {
        Ok(sandbox) => sandbox,
        Err(err) => {
            let kind = match err {
                SandboxError::Violation { .. } => ErrorKind::SandboxViolation,
                SandboxError::Io(_) => ErrorKind::SandboxViolation,
            };
            steps.push(step4.fail(ErrorRecord::new(kind, agent_name, err.to_string())));
            let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
            return TaskResult {
                status: TaskStatus::Error,
                agent: agent_name.to_string(),
                task: task.to_string(),
                task_id,
                started_at,
                completed_at: chrono::Utc::now(),
                steps,
                result: Value::Null,
                logs: logs_path,
                error: Some(ErrorRecord::new(kind, agent_name, err.to_string())),
            };
        }
    };
    steps.push(step4.complete(None));

    // Step 5: construct gated executor.
    let step5 = StepRecord::start(5, "construct_executor");
    let executor = GatedExecutor::new(
        agent_name,
        agent.capabilities.clone(),
        sandbox.root(),
        agent.max_task_timeout_seconds,
    );
    steps.push(step5.complete(None));

    // Step 6: validate the skill call against the agent's declared skills,
    // the registry, and its capability set.
    let mut step6 = StepRecord::start(6, "validate_skill_call");
    if !agent.skills.iter().any(|s| s == skill_name) {
        step6 = step6.fail(ErrorRecord::new(
            ErrorKind::SkillNotAllowed,
            agent_name,
            format!("agent does not declare skill '{skill_name}'"),
        ));
        steps.push(step6);
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(ErrorRecord::new(
                ErrorKind::SkillNotAllowed,
                agent_name,
                format!("agent does not declare skill '{skill_name}'"),
            )),
        };
    }

    let registry = world.registry.read();
    let Some(manifest) = registry.get(skill_name) else {
        step6 = step6.fail(ErrorRecord::new(
            ErrorKind::SkillMissing,
            agent_name,
            format!("skill '{skill_name}' is not registered"),
        ));
        steps.push(step6);
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(ErrorRecord::new(
                ErrorKind::SkillMissing,
                agent_name,
                format!("skill '{skill_name}' is not registered"),
            )),
        };
    };
    if !manifest.valid {
        step6 = step6.fail(ErrorRecord::new(
            ErrorKind::SkillMissing,
            agent_name,
            format!("skill '{skill_name}' failed manifest validation: {:?}", manifest.validation_errors),
        ));
        steps.push(step6);
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(ErrorRecord::new(ErrorKind::SkillMissing, agent_name, "skill manifest invalid")),
        };
    }

    let required: std::collections::HashSet<_> = manifest
        .requires_capabilities
        .iter()
        .filter_map(|raw| warden_capability::CapabilityTag::new(raw.clone()).ok())
        .collect();
    let missing = difference(&required, &agent.capabilities);
    for tag in &required {
        step6 = step6.with_capability_check(tag.as_str(), !missing.contains(tag));
    }
    if !missing.is_empty() {
        let missing_str = missing.iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>().join(", ");
        step6 = step6.fail(
            ErrorRecord::new(
                ErrorKind::CapabilityDenied,
                agent_name,
                format!("missing required capabilities: {missing_str}"),
            )
            .with_required(missing_str.clone()),
        );
        steps.push(step6);
        drop(registry);
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(
                ErrorRecord::new(ErrorKind::CapabilityDenied, agent_name, format!("missing required capabilities: {missing_str}"))
                    .with_required(missing_str),
            ),
        };
    }
    steps.push(step6.complete(None));
    drop(registry);

    // Step 7: load the skill through the builder registry.
    let step7 = StepRecord::start(7, "load_skill");
    let ctx = warden_skills::SkillContext {
        executor: &executor,
        sandbox: &sandbox,
        memory: &memory,
    };
    let Some(skill) = world.builders.build(skill_name, &ctx) else {
        steps.push(step7.fail(ErrorRecord::new(
            ErrorKind::SkillMissing,
            agent_name,
            format!("no builder registered for skill '{skill_name}'"),
        )));
        let _ = log.append("run_task", "failed", Some(serde_json::json!({ "task_id": task_id })));
        return TaskResult {
            status: TaskStatus::Error,
            agent: agent_name.to_string(),
            task: task.to_string(),
            task_id,
            started_at,
            completed_at: chrono::Utc::now(),
            steps,
            result: Value::Null,
            logs: logs_path,
            error: Some(ErrorRecord::new(ErrorKind::SkillMissing, agent_name, "no builder registered for skill")),
        };
    };
    steps.push(step7.complete(None));

    // Step 8: invoke the function.
    let step8 = StepRecord::start(8, "invoke_function");
    let outcome = skill.call(function, args.clone());
    let (status, result, error, step8) = if outcome.success {
        (TaskStatus::Success, outcome.data.clone(), None, step8.complete(Some(outcome.data.clone())))
    } else {
        let message = outcome.error.clone().unwrap_or_else(|| "skill returned failure".to_string());
        let mut details = serde_json::Map::new();
        details.insert("logs".to_string(), serde_json::json!(outcome.logs));
        let error = ErrorRecord::new(ErrorKind::ExecutionError, agent_name, message).with_details(details);
        (TaskStatus::Error, Value::Null, Some(error.clone()), step8.fail(error))
    };
    steps.push(step8);

    // Step 9: append history entry to memory (non-fatal on failure).
    let step9 = StepRecord::start(9, "record_history");
    let history_entry = serde_json::json!({
        "task_id": task_id,
        "skill": skill_name,
        "function": function,
        "args": args,
        "status": if status == TaskStatus::Success { "success" } else { "error" },
    });
    match memory.append_history(history_entry) {
        Ok(()) => steps.push(step9.complete(None)),
        Err(err) => {
            tracing::warn!(agent = agent_name, %err, "failed to record task history");
            steps.push(step9.fail(ErrorRecord::new(ErrorKind::MemoryError, agent_name, err.to_string())));
        }
    }

    // Step 10: assemble and log completion.
    let completed_at = chrono::Utc::now();
    let log_status = if status == TaskStatus::Success { "completed" } else { "failed" };
    let _ = log.append("run_task", log_status, Some(serde_json::json!({ "task_id": task_id })));

    TaskResult {
        status,
        agent: agent_name.to_string(),
        task: task.to_string(),
        task_id,
        started_at,
        completed_at,
        steps,
        result,
        logs: logs_path,
        error,
    }
}

/// Scrub proxy-related environment variables and force `no_proxy=*`,
/// enforced once per task ahead of every step that might shell out (§5's
/// offline guarantee, mirrored per-subprocess for `network.none` agents in
/// `warden_executor::GatedExecutor::run`).
fn scrub_proxy_env() {
    for var in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy", "ALL_PROXY", "all_proxy"] {
        std::env::remove_var(var);
    }
    std::env::set_var("no_proxy", "*");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_agent(dir: &std::path::Path, name: &str, body: &str) {
        let mut file = std::fs::File::create(dir.join(format!("{name}.yml"))).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    fn write_skill(skills_dir: &std::path::Path, name: &str, requires: &[&str]) {
        let dir = skills_dir.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let requires_yaml = requires
            .iter()
            .map(|r| format!("  - {r}"))
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(
            dir.join("skill.yml"),
            format!(
                "name: {name}\nprovides:\n  - read_file\nrequires_capabilities:\n{requires_yaml}\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join("skill.rs"), "// marker").unwrap();
    }

    #[test]
    fn happy_path_fs_read_file_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(
            &config.models_dir,
            "scout",
            "name: scout\ncapabilities:\n  - filesystem.read\nskills:\n  - fs\n",
        );
        write_skill(&config.skills_dir, "fs", &["filesystem.read"]);
        std::fs::create_dir_all(config.sandboxes_dir.join("scout").join("work")).unwrap();
        std::fs::write(config.sandboxes_dir.join("scout").join("work").join("hello.txt"), "hi").unwrap();

        let world = SupervisorWorld::bootstrap(config).unwrap();
        let result = run_skill_call(&world, "scout", "fs", "read_file", serde_json::json!({ "path": "hello.txt" }));
        assert!(result.is_success(), "{:?}", result.error);
    }

    #[test]
    fn capability_denied_when_skill_requires_uncovered_capability() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(&config.models_dir, "scout", "name: scout\nskills:\n  - fs\n");
        write_skill(&config.skills_dir, "fs", &["filesystem.read"]);

        let world = bootstrap_from(config);
        let result = run_skill_call(&world, "scout", "fs", "read_file", serde_json::json!({}));
        assert!(!result.is_success());
        assert_eq!(result.error.unwrap().error_type, ErrorKind::CapabilityDenied);
    }

    #[test]
    fn skill_not_allowed_when_not_declared_by_agent() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(&config.models_dir, "scout", "name: scout\ncapabilities:\n  - filesystem.read\n");
        write_skill(&config.skills_dir, "fs", &["filesystem.read"]);

        let world = bootstrap_from(config);
        let result = run_skill_call(&world, "scout", "fs", "read_file", serde_json::json!({}));
        assert_eq!(result.error.unwrap().error_type, ErrorKind::SkillNotAllowed);
    }

    #[test]
    fn skill_missing_when_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(
            &config.models_dir,
            "scout",
            "name: scout\ncapabilities:\n  - filesystem.read\nskills:\n  - ghost\n",
        );

        let world = bootstrap_from(config);
        let result = run_skill_call(&world, "scout", "ghost", "read_file", serde_json::json!({}));
        assert_eq!(result.error.unwrap().error_type, ErrorKind::SkillMissing);
    }

    #[test]
    fn informational_task_lists_available_skills() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(&config.models_dir, "scout", "name: scout\nskills:\n  - fs\n");

        let world = bootstrap_from(config);
        let result = run_task(&world, "scout", "please help me understand my skills", serde_json::json!({}));
        assert!(result.is_success());
        assert!(result.result["available_skills"].as_array().unwrap().contains(&serde_json::json!("fs")));
    }

    #[test]
    fn log_contains_started_and_terminal_entries_for_run_task() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::WardenConfig::at_root(dir.path());
        config.ensure_dirs().unwrap();
        write_agent(&config.models_dir, "scout", "name: scout\ncapabilities:\n  - filesystem.read\nskills:\n  - fs\n");
        write_skill(&config.skills_dir, "fs", &["filesystem.read"]);
        std::fs::create_dir_all(config.sandboxes_dir.join("scout").join("work")).unwrap();
        std::fs::write(config.sandboxes_dir.join("scout").join("work").join("hello.txt"), "hi").unwrap();

        let world = bootstrap_from(config.clone());
        let _ = run_skill_call(&world, "scout", "fs", "read_file", serde_json::json!({ "path": "hello.txt" }));

        let log = warden_log::ActionLog::open("scout", &config.logs_dir).unwrap();
        let entries = log.recent(10).unwrap();
        assert!(entries.iter().any(|e| e.action == "run_task" && e.status == "started"));
        assert!(entries.iter().any(|e| e.action == "run_task" && e.status == "completed"));
    }

    fn bootstrap_from(config: crate::config::WardenConfig) -> SupervisorWorld {
        SupervisorWorld::bootstrap(config).unwrap()
    }
}
