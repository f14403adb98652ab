//! `WardenConfig`: resolves the configurable filesystem prefix (§6) into
//! the concrete roots every crate in this workspace reads and writes.
//!
//! Grounded on the environment-variable resolution order recovered from
//! `original_source/agents/core/registry/skill_registry.py`'s
//! `get_registry()` and `agents/core/runtime/executor.py`: `AGENTS_ROOT`
//! wins outright if set; otherwise the root is `PREFIX` (falling back to
//! the source's own Termux-specific default, carried here purely as a
//! constant of last resort — this implementation is not Termux-specific)
//! joined with `share/agents`.

use std::path::PathBuf;

/// The source's own default install prefix, used only as a last-resort
/// fallback when neither `AGENTS_ROOT` nor `PREFIX` is set in the
/// environment.
const FALLBACK_PREFIX: &str = "/data/data/com.termux/files/usr";

/// Concrete filesystem roots the supervisor and every crate beneath it
/// read from and write to (§6's filesystem layout).
#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub root: PathBuf,
    pub models_dir: PathBuf,
    pub skills_dir: PathBuf,
    pub sandboxes_dir: PathBuf,
    pub memory_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub swarm_dir: PathBuf,
}

impl WardenConfig {
    /// Build a config rooted at an explicit path, bypassing environment
    /// resolution. Used by tests and embedders that already know their
    /// root.
    pub fn at_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        WardenConfig {
            models_dir: root.join("models"),
            skills_dir: root.join("skills"),
            sandboxes_dir: root.join("sandboxes"),
            memory_dir: root.join("memory"),
            logs_dir: root.join("logs"),
            swarm_dir: root.join("swarm"),
            root,
        }
    }

    /// Resolve the root from the environment per §6: `AGENTS_ROOT` wins
    /// outright; otherwise `PREFIX` (or the fallback constant) joined with
    /// `share/agents`.
    pub fn from_env() -> Self {
        if let Ok(agents_root) = std::env::var("AGENTS_ROOT") {
            return Self::at_root(agents_root);
        }
        let prefix = std::env::var("PREFIX").unwrap_or_else(|_| FALLBACK_PREFIX.to_string());
        Self::at_root(PathBuf::from(prefix).join("share").join("agents"))
    }

    /// Create every root directory this config names, if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.models_dir,
            &self.skills_dir,
            &self.sandboxes_dir,
            &self.memory_dir,
            &self.logs_dir,
            &self.swarm_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
