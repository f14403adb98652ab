//! Package manager skill (§4.6), grounded on `agents/skills/pkg/skill.py`'s
//! `PkgSkill`. Every command it runs — `pkg`, `dpkg`, `apt-cache` — is
//! capability-classified in the gated executor under `exec.pkg`, so this
//! skill never re-checks the capability itself; a denial simply surfaces
//! as the executor's error, the way the source lets a `PermissionError`
//! from `executor.run` propagate into `Skill.call`'s failure path.

use std::time::Duration;

use serde_json::{json, Value};

use warden_executor::ExecRequest;

use crate::skill_trait::{CallLog, Skill, SkillContext};

const FUNCTIONS: &[&str] = &[
    "install_package",
    "remove_package",
    "update_packages",
    "upgrade_packages",
    "search_packages",
    "list_installed",
    "get_package_info",
    "clean_cache",
];

pub struct PkgSkill<'a> {
    executor: &'a warden_executor::GatedExecutor,
}

impl<'a> PkgSkill<'a> {
    pub fn new(ctx: &SkillContext<'a>) -> Self {
        PkgSkill { executor: ctx.executor }
    }

    fn install_package(&self, package: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("installing package: {package}"));
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "install", "-y", package]).check(false))
            .map_err(|err| err.to_string())?;
        let success = outcome.success();
        log.log(format!("install {}", if success { "succeeded" } else { "failed" }));
        Ok(json!({
            "package": package,
            "installed": success,
            "output": outcome.stdout_string(),
            "errors": if success { Value::Null } else { json!(outcome.stderr_string()) },
        }))
    }

    fn remove_package(&self, package: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("removing package: {package}"));
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "uninstall", "-y", package]).check(false))
            .map_err(|err| err.to_string())?;
        let success = outcome.success();
        log.log(format!("remove {}", if success { "succeeded" } else { "failed" }));
        Ok(json!({
            "package": package,
            "removed": success,
            "output": outcome.stdout_string(),
            "errors": if success { Value::Null } else { json!(outcome.stderr_string()) },
        }))
    }

    fn update_packages(&self, log: &CallLog) -> Result<Value, String> {
        log.log("updating package lists");
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "update", "-y"]).check(false).timeout(Duration::from_secs(600)))
            .map_err(|err| err.to_string())?;
        let success = outcome.success();
        log.log(format!("update {}", if success { "succeeded" } else { "failed" }));
        Ok(json!({
            "updated": success,
            "output": outcome.stdout_string(),
            "errors": if success { Value::Null } else { json!(outcome.stderr_string()) },
        }))
    }

    fn upgrade_packages(&self, log: &CallLog) -> Result<Value, String> {
        log.log("upgrading all packages");
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "upgrade", "-y"]).check(false).timeout(Duration::from_secs(1800)))
            .map_err(|err| err.to_string())?;
        let success = outcome.success();
        log.log(format!("upgrade {}", if success { "succeeded" } else { "failed" }));
        Ok(json!({
            "upgraded": success,
            "output": outcome.stdout_string(),
            "errors": if success { Value::Null } else { json!(outcome.stderr_string()) },
        }))
    }

    fn search_packages(&self, query: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("searching for: {query}"));
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "search", query]).check(false))
            .map_err(|err| err.to_string())?;

        let mut packages = Vec::new();
        for line in outcome.stdout_string().lines() {
            let Some((_, rest)) = line.split_once('/') else { continue };
            let mut fields = rest.split_whitespace();
            if let Some(name) = fields.next() {
                let description: Vec<&str> = fields.collect();
                packages.push(json!({
                    "name": name,
                    "description": description.join(" "),
                }));
            }
        }

        log.log(format!("found {} packages", packages.len()));
        Ok(json!({"query": query, "count": packages.len(), "packages": packages}))
    }

    fn list_installed(&self, log: &CallLog) -> Result<Value, String> {
        log.log("listing installed packages");
        let outcome = self
            .executor
            .run(ExecRequest::new(["dpkg", "-l"]).check(false))
            .map_err(|err| err.to_string())?;

        let mut packages = Vec::new();
        for line in outcome.stdout_string().lines() {
            if !line.starts_with("ii") {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 3 {
                packages.push(json!({"name": fields[1], "version": fields[2]}));
            }
        }

        log.log(format!("found {} installed packages", packages.len()));
        Ok(json!({"count": packages.len(), "packages": packages}))
    }

    fn get_package_info(&self, package: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("getting info for: {package}"));
        let outcome = self
            .executor
            .run(ExecRequest::new(["apt-cache", "show", package]).check(false))
            .map_err(|err| err.to_string())?;

        let mut info = serde_json::Map::new();
        let mut current_key: Option<String> = None;
        for line in outcome.stdout_string().lines() {
            if let Some((key, value)) = line.split_once(": ") {
                if !line.starts_with(' ') {
                    info.insert(key.to_lowercase(), json!(value));
                    current_key = Some(key.to_lowercase());
                    continue;
                }
            }
            if let Some(ref key) = current_key {
                if line.starts_with(' ') {
                    let existing = info.get(key).and_then(Value::as_str).unwrap_or("").to_string();
                    info.insert(key.clone(), json!(format!("{existing}\n{line}")));
                }
            }
        }

        Ok(json!({"package": package, "found": !info.is_empty(), "info": info}))
    }

    fn clean_cache(&self, log: &CallLog) -> Result<Value, String> {
        log.log("cleaning package cache");
        let outcome = self
            .executor
            .run(ExecRequest::new(["pkg", "clean"]).check(false))
            .map_err(|err| err.to_string())?;
        let success = outcome.success();
        log.log(format!("clean {}", if success { "succeeded" } else { "failed" }));
        Ok(json!({"cleaned": success, "output": outcome.stdout_string()}))
    }
}

impl<'a> Skill for PkgSkill<'a> {
    fn name(&self) -> &'static str {
        "pkg"
    }

    fn functions(&self) -> &'static [&'static str] {
        FUNCTIONS
    }

    fn invoke(&self, function_name: &str, args: Value, log: &CallLog) -> Result<Value, String> {
        let str_arg = |key: &str| -> String { args.get(key).and_then(Value::as_str).unwrap_or("").to_string() };

        match function_name {
            "install_package" => self.install_package(&str_arg("package"), log),
            "remove_package" => self.remove_package(&str_arg("package"), log),
            "update_packages" => self.update_packages(log),
            "upgrade_packages" => self.upgrade_packages(log),
            "search_packages" => self.search_packages(&str_arg("query"), log),
            "list_installed" => self.list_installed(log),
            "get_package_info" => self.get_package_info(&str_arg("package"), log),
            "clean_cache" => self.clean_cache(log),
            other => Err(format!("unhandled function: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use warden_capability::CapabilityTag;
    use warden_executor::GatedExecutor;

    #[test]
    fn install_package_without_exec_pkg_capability_fails_as_executor_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", HashSet::<CapabilityTag>::new(), dir.path(), 60);
        let ctx_sandbox = warden_sandbox::Sandbox::create("scout", dir.path()).unwrap();
        let memory = warden_memory::AgentMemory::open("scout", dir.path().join("memory"), 1_048_576).unwrap();
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &ctx_sandbox,
            memory: &memory,
        };
        let skill = PkgSkill::new(&ctx);

        let outcome = skill.call("install_package", json!({"package": "vim"}));
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("exec.pkg"));
    }

    #[test]
    fn unknown_function_reports_available_functions() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", HashSet::<CapabilityTag>::new(), dir.path(), 60);
        let sandbox = warden_sandbox::Sandbox::create("scout", dir.path()).unwrap();
        let memory = warden_memory::AgentMemory::open("scout", dir.path().join("memory"), 1_048_576).unwrap();
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = PkgSkill::new(&ctx);

        let outcome = skill.call("does_not_exist", Value::Null);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("install_package"));
    }
}
