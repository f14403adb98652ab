//! The gated subprocess executor (§4.5): the single choke-point through
//! which every subprocess call and privileged filesystem operation passes.
//!
//! Grounded on `agents/core/runtime/executor.py`'s `AgentExecutor`. The
//! timeout/kill path differs from the source (which relies on Python's
//! `subprocess.run(timeout=...)`, itself backed by the OS process-group
//! semantics CPython wires up internally): this implementation polls
//! `Child::try_wait` and kills only the immediate child on timeout. A true
//! process-group kill would need a `libc`/`nix`-style dependency this
//! workspace does not carry anywhere in its own manifests, so this keeps
//! the dependency stack as-is rather than introducing one for this alone;
//! see `DESIGN.md`.

pub mod classify;
pub mod policy;

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use warden_capability::CapabilityTag;

pub use policy::NetworkPolicyViolation;

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const STDERR_SNIPPET_BYTES: usize = 500;
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("empty command")]
    EmptyCommand,
    #[error("network access denied for agent {agent:?}: {reason}")]
    NetworkViolation { agent: String, reason: String },
    #[error("agent {agent:?} lacks capability {capability:?} required to run {binary:?}")]
    CapabilityDenied {
        agent: String,
        capability: String,
        binary: String,
    },
    #[error("io error launching {binary:?}: {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command timed out after {seconds}s")]
    TimedOut { seconds: u64 },
    #[error("command exited with code {code}: {stderr_snippet}")]
    NonZeroExit { code: i32, stderr_snippet: String },
}

/// A request to run one command through the gated executor.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    command: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    check: bool,
    network_target: Option<String>,
}

impl ExecRequest {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExecRequest {
            command: command.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
            timeout: None,
            check: true,
            network_target: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a non-zero exit becomes an error (default `true`).
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// A hint (URL, host, `user@host`) used to classify the command's
    /// network target as loopback or not, for agents with `network.local`.
    pub fn network_target(mut self, target: impl Into<String>) -> Self {
        self.network_target = Some(target.into());
        self
    }
}

/// The captured result of a completed subprocess call.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ExecOutcome {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability-enforced subprocess executor, bound to one agent's
/// capability set and sandbox root (§4.5, pipeline step 5).
pub struct GatedExecutor {
    agent_name: String,
    capabilities: std::collections::HashSet<CapabilityTag>,
    sandbox_root: PathBuf,
    max_task_timeout_seconds: u64,
}

impl GatedExecutor {
    pub fn new(
        agent_name: impl Into<String>,
        capabilities: std::collections::HashSet<CapabilityTag>,
        sandbox_root: impl Into<PathBuf>,
        max_task_timeout_seconds: u64,
    ) -> Self {
        GatedExecutor {
            agent_name: agent_name.into(),
            capabilities,
            sandbox_root: sandbox_root.into(),
            max_task_timeout_seconds,
        }
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        CapabilityTag::new(tag)
            .map(|tag| self.capabilities.contains(&tag))
            .unwrap_or(false)
    }

    fn require_capability(&self, capability: &str, binary: &str) -> Result<(), ExecutorError> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            warn!(agent = %self.agent_name, capability, binary, "capability denied");
            Err(ExecutorError::CapabilityDenied {
                agent: self.agent_name.clone(),
                capability: capability.to_string(),
                binary: binary.to_string(),
            })
        }
    }

    /// Whether `binary` could run given the agent's current capabilities
    /// (no unlisted-binary check fails; unlisted binaries always pass).
    pub fn can_run(&self, binary: &str) -> bool {
        match classify::binary_capability(binary) {
            Some(cap) => self.has_capability(cap),
            None => true,
        }
    }

    /// Resolve `binary` on `PATH`, refusing to report a path the agent
    /// lacks capability to run.
    pub fn which(&self, binary: &str) -> Option<PathBuf> {
        if !self.can_run(binary) {
            return None;
        }
        which(binary)
    }

    fn validate(&self, request: &ExecRequest) -> Result<(), ExecutorError> {
        if request.command.is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }
        let binary = &request.command[0];

        if classify::is_network_binary(binary) {
            policy::evaluate_network_policy(&self.capabilities, request.network_target.as_deref())
                .map_err(|violation| ExecutorError::NetworkViolation {
                    agent: self.agent_name.clone(),
                    reason: violation.reason,
                })?;
        }

        if let Some(capability) = classify::binary_capability(binary) {
            self.require_capability(capability, binary)?;
        }

        Ok(())
    }

    /// Run a command through the gate, enforcing the §4.5 pre-run
    /// validation sequence, a timeout, and post-run handling.
    pub fn run(&self, request: ExecRequest) -> Result<ExecOutcome, ExecutorError> {
        self.validate(&request)?;

        let cwd = request
            .cwd
            .clone()
            .unwrap_or_else(|| self.sandbox_root.join("work"));
        std::fs::create_dir_all(&cwd).map_err(|source| ExecutorError::Io {
            binary: request.command[0].clone(),
            source,
        })?;

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(request.env.clone());
        if self.has_capability("network.none") {
            for key in ["http_proxy", "https_proxy", "HTTP_PROXY", "HTTPS_PROXY"] {
                env.insert(key.to_string(), String::new());
            }
            env.insert("no_proxy".to_string(), "*".to_string());
        }

        let timeout_seconds = request
            .timeout
            .map(|t| t.as_secs())
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
            .min(self.max_task_timeout_seconds);
        let timeout = Duration::from_secs(timeout_seconds);

        info!(
            agent = %self.agent_name,
            command = %request.command.join(" "),
            cwd = %cwd.display(),
            "executing command"
        );

        let binary = request.command[0].clone();
        let outcome = spawn_and_wait(&request.command, &cwd, &env, timeout).map_err(|source| {
            ExecutorError::Io {
                binary: binary.clone(),
                source,
            }
        })?;

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                warn!(agent = %self.agent_name, command = %request.command.join(" "), timeout_seconds, "command timed out");
                return Err(ExecutorError::TimedOut {
                    seconds: timeout_seconds,
                });
            }
        };

        if request.check && outcome.exit_code != Some(0) {
            let stderr_snippet = truncate_bytes(&outcome.stderr, STDERR_SNIPPET_BYTES);
            warn!(
                agent = %self.agent_name,
                command = %request.command.join(" "),
                exit_code = ?outcome.exit_code,
                "command exited non-zero"
            );
            return Err(ExecutorError::NonZeroExit {
                code: outcome.exit_code.unwrap_or(-1),
                stderr_snippet,
            });
        }

        info!(agent = %self.agent_name, exit_code = ?outcome.exit_code, "command completed");
        Ok(outcome)
    }

    /// Run a shell script. Requires `exec.shell`.
    pub fn run_shell(&self, script: &str, timeout: Option<Duration>) -> Result<ExecOutcome, ExecutorError> {
        self.require_capability("exec.shell", "bash")?;
        let shell = which("bash")
            .or_else(|| which("sh"))
            .ok_or_else(|| ExecutorError::Io {
                binary: "bash".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no shell available"),
            })?;
        let mut request = ExecRequest::new([shell.display().to_string(), "-c".to_string(), script.to_string()]);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.run(request)
    }

    /// Run a Python script. Requires `exec.python`.
    pub fn run_python(&self, script: &str, timeout: Option<Duration>) -> Result<ExecOutcome, ExecutorError> {
        self.require_capability("exec.python", "python3")?;
        let python = which("python3")
            .or_else(|| which("python"))
            .ok_or_else(|| ExecutorError::Io {
                binary: "python3".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no python interpreter available"),
            })?;
        let mut request = ExecRequest::new([python.display().to_string(), "-c".to_string(), script.to_string()]);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.run(request)
    }
}

fn truncate_bytes(bytes: &[u8], limit: usize) -> String {
    let truncated = if bytes.len() > limit { &bytes[..limit] } else { bytes };
    String::from_utf8_lossy(truncated).into_owned()
}

/// Search `PATH` for an executable named `binary`, the way `shutil.which`
/// does in the source.
pub fn which(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Spawn `command`, poll for completion up to `timeout`, and capture its
/// output. `Ok(None)` means the process was killed after exceeding the
/// timeout.
fn spawn_and_wait(
    command: &[String],
    cwd: &Path,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> std::io::Result<Option<ExecOutcome>> {
    let start = Instant::now();
    let mut child = Command::new(&command[0])
        .args(&command[1..])
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");
    let stdout_thread = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_thread = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    match status {
        Some(status) => {
            let stdout = stdout_thread.join().unwrap_or_default();
            let stderr = stderr_thread.join().unwrap_or_default();
            Ok(Some(ExecOutcome {
                exit_code: status.code(),
                stdout,
                stderr,
                duration: start.elapsed(),
            }))
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_thread.join();
            let _ = stderr_thread.join();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn caps(tags: &[&str]) -> HashSet<CapabilityTag> {
        tags.iter().map(|tag| CapabilityTag::new(*tag).unwrap()).collect()
    }

    #[test]
    fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let err = executor.run(ExecRequest::new(Vec::<String>::new())).unwrap_err();
        assert!(matches!(err, ExecutorError::EmptyCommand));
    }

    #[test]
    fn unlisted_binary_runs_without_capability() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let outcome = executor.run(ExecRequest::new(["echo", "hi"])).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout_string().trim(), "hi");
    }

    #[test]
    fn listed_binary_without_capability_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let err = executor.run(ExecRequest::new(["git", "status"])).unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::CapabilityDenied { capability, .. } if capability == "exec.git"
        ));
    }

    #[test]
    fn network_binary_with_network_none_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&["network.none"]), dir.path(), 60);
        let err = executor.run(ExecRequest::new(["curl", "https://example.com"])).unwrap_err();
        assert!(matches!(err, ExecutorError::NetworkViolation { .. }));
    }

    #[test]
    fn network_none_scrubs_proxy_env_for_permitted_binary() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new(
            "scout",
            caps(&["network.none", "exec.shell"]),
            dir.path(),
            60,
        );
        let outcome = executor
            .run(
                ExecRequest::new(["sh", "-c", "echo \"$http_proxy|$no_proxy\""])
                    .env("http_proxy", "http://proxy.example:8080"),
            )
            .unwrap();
        assert_eq!(outcome.stdout_string().trim(), "|*");
    }

    #[test]
    fn nonzero_exit_with_check_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let err = executor
            .run(ExecRequest::new(["false"]))
            .expect_err("false always exits 1");
        assert!(matches!(err, ExecutorError::NonZeroExit { code: 1, .. }));
    }

    #[test]
    fn nonzero_exit_without_check_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let outcome = executor
            .run(ExecRequest::new(["false"]).check(false))
            .unwrap();
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let err = executor
            .run(ExecRequest::new(["sleep", "5"]).timeout(Duration::from_millis(100)))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::TimedOut { .. }));
    }

    #[test]
    fn run_shell_requires_exec_shell_capability() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let err = executor.run_shell("echo hi", None).unwrap_err();
        assert!(matches!(err, ExecutorError::CapabilityDenied { .. }));
    }

    #[test]
    fn run_shell_executes_with_capability() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&["exec.shell"]), dir.path(), 60);
        let outcome = executor.run_shell("echo from-shell", None).unwrap();
        assert_eq!(outcome.stdout_string().trim(), "from-shell");
    }

    #[test]
    fn working_directory_defaults_to_sandbox_work() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&[]), dir.path(), 60);
        let outcome = executor.run(ExecRequest::new(["pwd"])).unwrap();
        let expected = dir.path().join("work");
        assert_eq!(outcome.stdout_string().trim(), expected.to_string_lossy());
    }

    #[test]
    fn can_run_reflects_capability_possession() {
        let dir = tempfile::tempdir().unwrap();
        let executor = GatedExecutor::new("scout", caps(&["exec.git"]), dir.path(), 60);
        assert!(executor.can_run("git"));
        assert!(!executor.can_run("docker"));
        assert!(executor.can_run("echo"));
    }
}
