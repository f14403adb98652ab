//! Filesystem operations skill (§4.6), grounded on
//! `agents/skills/fs/skill.py`'s `FilesystemSkill`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::skill_trait::{CallLog, Skill, SkillContext};

const FUNCTIONS: &[&str] = &[
    "list_dir",
    "read_file",
    "write_file",
    "copy",
    "move",
    "delete",
    "exists",
    "get_info",
    "find",
    "grep",
];

const DEFAULT_MAX_READ_BYTES: u64 = 1024 * 1024;
const FIND_RESULT_LIMIT: usize = 1000;
const GREP_MATCH_LIMIT: usize = 100;

/// Borrows the agent's sandbox and executor for the lifetime of a task.
pub struct FsSkill<'a> {
    sandbox: &'a warden_sandbox::Sandbox,
    executor: &'a warden_executor::GatedExecutor,
}

impl<'a> FsSkill<'a> {
    pub fn new(ctx: &SkillContext<'a>) -> Self {
        FsSkill {
            sandbox: ctx.sandbox,
            executor: ctx.executor,
        }
    }

    /// Resolve `raw` against the sandbox, rejecting anything the
    /// canonicalized path places outside its root. §7 states plainly that
    /// any path operation outside the sandbox through the gated executor
    /// is a violation with no exception, so unlike the per-function
    /// `filesystem.write`/`filesystem.delete` capability checks below,
    /// there is no broader-capability escape hatch here.
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let path = if raw == "." {
            self.sandbox.root().to_path_buf()
        } else {
            Path::new(raw).to_path_buf()
        };

        self.sandbox
            .ensure_contained(&path)
            .map_err(|_| format!("path {raw:?} is outside the sandbox"))
    }

    fn list_dir(&self, path: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("listing: {path}"));
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(json!({"error": format!("path not found: {path}"), "items": []}));
        }
        if !resolved.is_dir() {
            return Ok(json!({"error": format!("not a directory: {path}"), "items": []}));
        }

        let mut entries: Vec<fs::DirEntry> = fs::read_dir(&resolved)
            .map_err(|err| err.to_string())?
            .filter_map(Result::ok)
            .collect();
        entries.sort_by_key(|entry| entry.file_name());

        let items: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let file_type = entry.file_type().ok();
                let is_dir = file_type.map(|ft| ft.is_dir()).unwrap_or(false);
                let size = if is_dir { 0 } else { entry.metadata().map(|m| m.len()).unwrap_or(0) };
                json!({
                    "name": entry.file_name().to_string_lossy(),
                    "type": if is_dir { "dir" } else { "file" },
                    "size": size,
                })
            })
            .collect();

        Ok(json!({
            "path": resolved.display().to_string(),
            "count": items.len(),
            "items": items,
        }))
    }

    fn read_file(&self, path: &str, max_size: u64, log: &CallLog) -> Result<Value, String> {
        log.log(format!("reading: {path}"));
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(json!({"error": format!("file not found: {path}"), "content": Value::Null}));
        }
        if !resolved.is_file() {
            return Ok(json!({"error": format!("not a file: {path}"), "content": Value::Null}));
        }

        let size = fs::metadata(&resolved).map_err(|err| err.to_string())?.len();
        if size > max_size {
            return Ok(json!({
                "error": format!("file too large: {size} bytes (max {max_size})"),
                "content": Value::Null,
            }));
        }

        let bytes = fs::read(&resolved).map_err(|err| err.to_string())?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(json!({
                "path": resolved.display().to_string(),
                "size": size,
                "content": content,
            })),
            Err(_) => Ok(json!({"error": "binary file, cannot read as text", "content": Value::Null})),
        }
    }

    fn write_file(&self, path: &str, content: &str, log: &CallLog) -> Result<Value, String> {
        if !self.executor.has_capability("filesystem.write") {
            return Ok(json!({"error": "filesystem.write capability required", "written": false}));
        }
        log.log(format!("writing: {path}"));
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
        fs::write(&resolved, content).map_err(|err| err.to_string())?;

        Ok(json!({
            "path": resolved.display().to_string(),
            "written": true,
            "size": content.len(),
        }))
    }

    fn copy(&self, src: &str, dest: &str, log: &CallLog) -> Result<Value, String> {
        if !self.executor.has_capability("filesystem.write") {
            return Ok(json!({"error": "filesystem.write capability required", "copied": false}));
        }
        log.log(format!("copying: {src} -> {dest}"));
        let src_resolved = self.resolve(src)?;
        let dest_resolved = self.resolve(dest)?;

        if !src_resolved.exists() {
            return Ok(json!({"error": format!("source not found: {src}"), "copied": false}));
        }

        let result = if src_resolved.is_dir() {
            copy_dir_all(&src_resolved, &dest_resolved)
        } else {
            dest_resolved
                .parent()
                .map(fs::create_dir_all)
                .transpose()
                .and_then(|_| fs::copy(&src_resolved, &dest_resolved).map(|_| ()))
        };

        match result {
            Ok(()) => Ok(json!({
                "src": src_resolved.display().to_string(),
                "dest": dest_resolved.display().to_string(),
                "copied": true,
            })),
            Err(err) => Ok(json!({"error": err.to_string(), "copied": false})),
        }
    }

    fn move_path(&self, src: &str, dest: &str, log: &CallLog) -> Result<Value, String> {
        if !self.executor.has_capability("filesystem.write") {
            return Ok(json!({"error": "filesystem.write capability required", "moved": false}));
        }
        log.log(format!("moving: {src} -> {dest}"));
        let src_resolved = self.resolve(src)?;
        let dest_resolved = self.resolve(dest)?;

        if !src_resolved.exists() {
            return Ok(json!({"error": format!("source not found: {src}"), "moved": false}));
        }

        let result = dest_resolved
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| fs::rename(&src_resolved, &dest_resolved));

        match result {
            Ok(()) => Ok(json!({
                "src": src_resolved.display().to_string(),
                "dest": dest_resolved.display().to_string(),
                "moved": true,
            })),
            Err(err) => Ok(json!({"error": err.to_string(), "moved": false})),
        }
    }

    fn delete(&self, path: &str, log: &CallLog) -> Result<Value, String> {
        if !self.executor.has_capability("filesystem.delete") {
            return Ok(json!({"error": "filesystem.delete capability required", "deleted": false}));
        }
        log.log(format!("deleting: {path}"));
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(json!({"error": format!("path not found: {path}"), "deleted": false}));
        }

        let result = if resolved.is_dir() {
            fs::remove_dir_all(&resolved)
        } else {
            fs::remove_file(&resolved)
        };

        match result {
            Ok(()) => Ok(json!({"path": resolved.display().to_string(), "deleted": true})),
            Err(err) => Ok(json!({"error": err.to_string(), "deleted": false})),
        }
    }

    fn exists(&self, path: &str) -> Result<Value, String> {
        let resolved = self.resolve(path)?;
        Ok(json!({
            "path": resolved.display().to_string(),
            "exists": resolved.exists(),
            "is_file": resolved.is_file(),
            "is_dir": resolved.is_dir(),
        }))
    }

    fn get_info(&self, path: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("getting info: {path}"));
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(json!({"error": format!("path not found: {path}")}));
        }

        let metadata = fs::metadata(&resolved).map_err(|err| err.to_string())?;
        Ok(json!({
            "path": resolved.display().to_string(),
            "name": resolved.file_name().map(|n| n.to_string_lossy().to_string()),
            "type": if metadata.is_dir() { "dir" } else { "file" },
            "size": metadata.len(),
        }))
    }

    fn find(&self, path: &str, pattern: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("finding: {pattern} in {path}"));
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(json!({"error": format!("path not found: {path}"), "files": []}));
        }

        let matcher = glob_to_matcher(pattern);
        let files: Vec<String> = walkdir::WalkDir::new(&resolved)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| matcher(name))
                    .unwrap_or(false)
            })
            .take(FIND_RESULT_LIMIT)
            .map(|entry| entry.path().display().to_string())
            .collect();

        Ok(json!({
            "path": resolved.display().to_string(),
            "pattern": pattern,
            "count": files.len(),
            "files": files,
        }))
    }

    fn grep(&self, pattern: &str, path: &str, log: &CallLog) -> Result<Value, String> {
        log.log(format!("grepping: {pattern} in {path}"));
        let resolved = self.resolve(path)?;

        let outcome = self
            .executor
            .run(
                warden_executor::ExecRequest::new(["grep", "-rn", pattern, &resolved.display().to_string()])
                    .check(false)
                    .timeout(std::time::Duration::from_secs(60)),
            )
            .map_err(|err| err.to_string())?;

        let mut matches = Vec::new();
        for line in outcome.stdout_string().lines().take(GREP_MATCH_LIMIT) {
            let parts: Vec<&str> = line.splitn(3, ':').collect();
            if parts.len() == 3 {
                matches.push(json!({
                    "file": parts[0],
                    "line": parts[1].parse::<u64>().unwrap_or(0),
                    "text": parts[2],
                }));
            }
        }

        Ok(json!({
            "pattern": pattern,
            "path": path,
            "count": matches.len(),
            "matches": matches,
        }))
    }
}

fn copy_dir_all(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// A tiny `*`/`?`-only glob matcher, enough for the shell-style patterns
/// `find` is typically called with (`*.rs`, `test_*`).
fn glob_to_matcher(pattern: &str) -> impl Fn(&str) -> bool + '_ {
    move |candidate: &str| glob_match(pattern, candidate)
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    fn inner(pattern: &[u8], candidate: &[u8]) -> bool {
        match (pattern.first(), candidate.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], candidate) || (!candidate.is_empty() && inner(pattern, &candidate[1..]))
            }
            (Some(b'?'), Some(_)) => inner(&pattern[1..], &candidate[1..]),
            (Some(p), Some(c)) if p == c => inner(&pattern[1..], &candidate[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), candidate.as_bytes())
}

impl<'a> Skill for FsSkill<'a> {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn functions(&self) -> &'static [&'static str] {
        FUNCTIONS
    }

    fn invoke(&self, function_name: &str, args: Value, log: &CallLog) -> Result<Value, String> {
        let str_arg = |key: &str, default: &str| -> String {
            args.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
        };

        match function_name {
            "list_dir" => self.list_dir(&str_arg("path", "."), log),
            "read_file" => {
                let max_size = args.get("max_size").and_then(Value::as_u64).unwrap_or(DEFAULT_MAX_READ_BYTES);
                self.read_file(&str_arg("path", ""), max_size, log)
            }
            "write_file" => self.write_file(&str_arg("path", ""), &str_arg("content", ""), log),
            "copy" => self.copy(&str_arg("src", ""), &str_arg("dest", ""), log),
            "move" => self.move_path(&str_arg("src", ""), &str_arg("dest", ""), log),
            "delete" => self.delete(&str_arg("path", ""), log),
            "exists" => self.exists(&str_arg("path", "")),
            "get_info" => self.get_info(&str_arg("path", ""), log),
            "find" => self.find(&str_arg("path", "."), &str_arg("pattern", "*"), log),
            "grep" => self.grep(&str_arg("pattern", ""), &str_arg("path", "."), log),
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
    use warden_memory::AgentMemory;
    use warden_sandbox::Sandbox;

    fn caps(tags: &[&str]) -> HashSet<CapabilityTag> {
        tags.iter().map(|tag| CapabilityTag::new(*tag).unwrap()).collect()
    }

    fn fixture(tags: &[&str]) -> (tempfile::TempDir, Sandbox, AgentMemory, GatedExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let memory = AgentMemory::open("scout", dir.path().join("memory"), 1_048_576).unwrap();
        let executor = GatedExecutor::new("scout", caps(tags), sandbox.root(), 60);
        (dir, sandbox, memory, executor)
    }

    #[test]
    fn write_then_read_round_trips_within_sandbox() {
        let (_dir, sandbox, memory, executor) = fixture(&["filesystem.read", "filesystem.write"]);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = FsSkill::new(&ctx);

        let target = sandbox.path_in(warden_sandbox::Region::Work, Some("note.txt"));
        let outcome = skill.call(
            "write_file",
            json!({"path": target.to_string_lossy(), "content": "hello"}),
        );
        assert!(outcome.success, "{:?}", outcome.error);

        let outcome = skill.call("read_file", json!({"path": target.to_string_lossy()}));
        assert!(outcome.success);
        assert_eq!(outcome.data["content"], json!("hello"));
    }

    #[test]
    fn write_without_capability_is_refused_as_data_not_error() {
        let (_dir, sandbox, memory, executor) = fixture(&["filesystem.read"]);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = FsSkill::new(&ctx);

        let target = sandbox.path_in(warden_sandbox::Region::Work, Some("note.txt"));
        let outcome = skill.call(
            "write_file",
            json!({"path": target.to_string_lossy(), "content": "hello"}),
        );
        assert!(outcome.success);
        assert_eq!(outcome.data["written"], json!(false));
    }

    #[test]
    fn path_outside_sandbox_is_denied_regardless_of_capability() {
        let (dir, sandbox, memory, executor) = fixture(&["filesystem.read"]);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = FsSkill::new(&ctx);

        let outside = dir.path().join("outside.txt");
        fs::write(&outside, "secret").unwrap();
        let outcome = skill.call("read_file", json!({"path": outside.to_string_lossy()}));
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("outside the sandbox"));
    }

    #[test]
    fn list_dir_reports_items_sorted_by_name() {
        let (_dir, sandbox, memory, executor) = fixture(&["filesystem.read", "filesystem.write"]);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = FsSkill::new(&ctx);

        sandbox.write_file(warden_sandbox::Region::Work, "b.txt", b"1").unwrap();
        sandbox.write_file(warden_sandbox::Region::Work, "a.txt", b"2").unwrap();

        let work_dir = sandbox.path_in(warden_sandbox::Region::Work, None);
        let outcome = skill.call("list_dir", json!({"path": work_dir.to_string_lossy()}));
        assert!(outcome.success);
        let items = outcome.data["items"].as_array().unwrap();
        assert_eq!(items[0]["name"], json!("a.txt"));
        assert_eq!(items[1]["name"], json!("b.txt"));
    }

    #[test]
    fn delete_without_capability_refuses() {
        let (_dir, sandbox, memory, executor) = fixture(&["filesystem.read", "filesystem.write"]);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };
        let skill = FsSkill::new(&ctx);

        let path = sandbox.write_file(warden_sandbox::Region::Work, "gone.txt", b"x").unwrap();
        let outcome = skill.call("delete", json!({"path": path.to_string_lossy()}));
        assert!(outcome.success);
        assert_eq!(outcome.data["deleted"], json!(false));
        assert!(path.exists());
    }

    #[test]
    fn glob_matcher_handles_star_and_question_mark() {
        assert!(glob_match("*.rs", "lib.rs"));
        assert!(!glob_match("*.rs", "lib.py"));
        assert!(glob_match("test_?.txt", "test_1.txt"));
    }
}
