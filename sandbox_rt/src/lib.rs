//! Per-agent sandboxed filesystem subtrees (§4.2).
//!
//! Each agent gets an isolated directory tree under a shared sandboxes
//! root: `tmp/` (scratch, cleaned on demand), `work/` (per-task working
//! directories), `output/` (preserved across resets), `cache/` (preserved
//! across resets and destroys only on explicit [`Sandbox::destroy`]).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// A sandbox's four standard subdirectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Tmp,
    Work,
    Output,
    Cache,
}

impl Region {
    fn as_str(self) -> &'static str {
        match self {
            Region::Tmp => "tmp",
            Region::Work => "work",
            Region::Output => "output",
            Region::Cache => "cache",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("path {attempted:?} escapes sandbox root for agent {agent:?}")]
    Violation { attempted: PathBuf, agent: String },
}

/// Per-region byte totals, mirroring the `disk_usage` contract of §4.2.
#[derive(Debug, Clone)]
pub struct DiskUsage {
    pub agent_name: String,
    pub root: PathBuf,
    pub tmp_bytes: u64,
    pub work_bytes: u64,
    pub output_bytes: u64,
    pub cache_bytes: u64,
    pub total_bytes: u64,
}

/// A single agent's isolated filesystem subtree.
#[derive(Debug)]
pub struct Sandbox {
    agent_name: String,
    root: PathBuf,
    canonical_root: PathBuf,
}

impl Sandbox {
    /// Create (or reopen) the sandbox for `agent_name` under `sandboxes_dir`,
    /// creating its four standard subdirectories if they don't exist.
    ///
    /// Creation failure is fatal only for the caller's current operation —
    /// no sandbox state is retained on error.
    pub fn create(agent_name: &str, sandboxes_dir: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = sandboxes_dir.as_ref().join(agent_name);
        for region in [Region::Tmp, Region::Work, Region::Output, Region::Cache] {
            fs::create_dir_all(root.join(region.as_str()))?;
        }
        let canonical_root = root.canonicalize()?;
        Ok(Self {
            agent_name: agent_name.to_string(),
            root,
            canonical_root,
        })
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to a region, or a named file within it. Does not check that the
    /// file exists.
    pub fn path_in(&self, region: Region, name: Option<&str>) -> PathBuf {
        let dir = self.root.join(region.as_str());
        match name {
            Some(name) => dir.join(name),
            None => dir,
        }
    }

    /// Create (or reuse) a dedicated work subdirectory for a task.
    pub fn create_task_dir(&self, task_id: &str) -> Result<PathBuf, SandboxError> {
        let dir = self.path_in(Region::Work, Some(task_id));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Resolve `path` to its fully canonical form, even when it (or a
    /// trailing portion of it) does not yet exist — walking up to the
    /// nearest existing ancestor, canonicalizing that, and rejoining the
    /// remaining components. This is what lets containment checks catch a
    /// symlink planted partway down a not-yet-created path.
    fn resolve(&self, path: &Path) -> Result<PathBuf, SandboxError> {
        if let Ok(canonical) = path.canonicalize() {
            return Ok(canonical);
        }
        let mut remainder: Vec<std::ffi::OsString> = Vec::new();
        let mut cursor = path;
        loop {
            let name = cursor
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();
            remainder.push(name);
            match cursor.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    if let Ok(canonical_parent) = parent.canonicalize() {
                        let mut resolved = canonical_parent;
                        for component in remainder.iter().rev() {
                            resolved.push(component);
                        }
                        return Ok(resolved);
                    }
                    cursor = parent;
                }
                _ => {
                    // No existing ancestor at all; fall back to a lexical join
                    // against the sandbox root so at least relative paths
                    // resolve deterministically.
                    let mut resolved = self.canonical_root.clone();
                    for component in remainder.iter().rev() {
                        resolved.push(component);
                    }
                    return Ok(resolved);
                }
            }
        }
    }

    /// Whether `path` (resolved, symlinks included) lies inside this
    /// sandbox's root.
    pub fn contains(&self, path: impl AsRef<Path>) -> Result<bool, SandboxError> {
        let resolved = self.resolve(path.as_ref())?;
        Ok(resolved.starts_with(&self.canonical_root))
    }

    /// Resolve and verify `path` is inside the sandbox, returning the
    /// resolved path. Callers outside the gated executor that need to
    /// actually touch the filesystem should use this rather than
    /// [`Sandbox::contains`] alone, to avoid a check/use race on the
    /// unresolved path.
    pub fn ensure_contained(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let path = path.as_ref();
        let resolved = self.resolve(path)?;
        if resolved.starts_with(&self.canonical_root) {
            Ok(resolved)
        } else {
            Err(SandboxError::Violation {
                attempted: path.to_path_buf(),
                agent: self.agent_name.clone(),
            })
        }
    }

    fn clean_region(&self, region: Region) -> Result<usize, SandboxError> {
        let dir = self.path_in(region, None);
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(agent = %self.agent_name, %err, "failed to read sandbox entry during reset");
                    continue;
                }
            };
            let path = entry.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => count += 1,
                Err(err) => warn!(agent = %self.agent_name, path = %path.display(), %err, "failed to remove sandbox entry during reset"),
            }
        }
        Ok(count)
    }

    /// Remove everything under `tmp/`. Individual removal failures are
    /// logged and skipped rather than aborting the reset.
    pub fn reset_tmp(&self) -> Result<usize, SandboxError> {
        self.clean_region(Region::Tmp)
    }

    /// Remove everything under `work/`. Output and cache are untouched.
    pub fn reset_work(&self) -> Result<usize, SandboxError> {
        self.clean_region(Region::Work)
    }

    /// Completely remove the sandbox, including cache.
    pub fn destroy(self) -> Result<(), SandboxError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    fn region_size(&self, region: Region) -> u64 {
        let dir = self.path_in(region, None);
        if !dir.exists() {
            return 0;
        }
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }

    pub fn disk_usage(&self) -> DiskUsage {
        let tmp_bytes = self.region_size(Region::Tmp);
        let work_bytes = self.region_size(Region::Work);
        let output_bytes = self.region_size(Region::Output);
        let cache_bytes = self.region_size(Region::Cache);
        DiskUsage {
            agent_name: self.agent_name.clone(),
            root: self.root.clone(),
            tmp_bytes,
            work_bytes,
            output_bytes,
            cache_bytes,
            total_bytes: tmp_bytes + work_bytes + output_bytes + cache_bytes,
        }
    }

    /// Every file currently under `output/`.
    pub fn list_outputs(&self) -> Vec<PathBuf> {
        let dir = self.path_in(Region::Output, None);
        if !dir.exists() {
            return Vec::new();
        }
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }

    pub fn write_file(&self, region: Region, filename: &str, content: &[u8]) -> Result<PathBuf, SandboxError> {
        let dir = self.path_in(region, None);
        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read_file(&self, region: Region, filename: &str) -> Result<Option<Vec<u8>>, SandboxError> {
        let path = self.path_in(region, Some(filename));
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_populates_standard_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        for region in ["tmp", "work", "output", "cache"] {
            assert!(sandbox.root().join(region).is_dir());
        }
    }

    #[test]
    fn contains_accepts_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let inside = sandbox.path_in(Region::Work, Some("file.txt"));
        assert!(sandbox.contains(&inside).unwrap());
    }

    #[test]
    fn contains_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let outside = dir.path().join("not-the-sandbox").join("evil.txt");
        assert!(!sandbox.contains(&outside).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn contains_rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let outside_target = dir.path().join("outside");
        fs::create_dir_all(&outside_target).unwrap();
        let link = sandbox.path_in(Region::Work, Some("escape"));
        std::os::unix::fs::symlink(&outside_target, &link).unwrap();
        let probe = link.join("secret.txt");
        assert!(!sandbox.contains(&probe).unwrap());
        assert!(sandbox.ensure_contained(&probe).is_err());
    }

    #[test]
    fn write_then_read_round_trips_within_region() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        sandbox.write_file(Region::Output, "result.txt", b"done").unwrap();
        let read_back = sandbox.read_file(Region::Output, "result.txt").unwrap();
        assert_eq!(read_back, Some(b"done".to_vec()));
    }

    #[test]
    fn reset_tmp_empties_tmp_but_preserves_output() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        sandbox.write_file(Region::Tmp, "scratch.txt", b"x").unwrap();
        sandbox.write_file(Region::Output, "keep.txt", b"y").unwrap();

        let removed = sandbox.reset_tmp().unwrap();
        assert_eq!(removed, 1);
        assert!(sandbox.read_file(Region::Tmp, "scratch.txt").unwrap().is_none());
        assert!(sandbox.read_file(Region::Output, "keep.txt").unwrap().is_some());
    }

    #[test]
    fn disk_usage_reports_bytes_per_region() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        sandbox.write_file(Region::Cache, "blob.bin", &[0u8; 128]).unwrap();
        let usage = sandbox.disk_usage();
        assert_eq!(usage.cache_bytes, 128);
        assert_eq!(usage.total_bytes, 128);
    }

    #[test]
    fn destroy_removes_sandbox_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let root = sandbox.root().to_path_buf();
        sandbox.destroy().unwrap();
        assert!(!root.exists());
    }
}
