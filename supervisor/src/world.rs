//! `SupervisorWorld`: the explicit context object every entry point is
//! threaded through, replacing the source's process-wide singletons
//! (`get_daemon()`, `get_registry()`, `_default_loader`) per SPEC_FULL.md
//! §9/Glossary's "World / Context" note.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;

use warden_capability::{AgentConfig, AgentLoadError};
use warden_log::ActionLog;
use warden_memory::{AgentMemory, MemoryStats};
use warden_sandbox::{DiskUsage, Sandbox};
use warden_skills::{DiscoveryReport, SkillBuilderRegistry, SkillRegistry};
use warden_swarm::SwarmCoordinator;

use crate::config::WardenConfig;

/// One malformed or unreadable agent manifest, skipped at load time rather
/// than aborting the supervisor (§4.7: "the supervisor never aborts
/// because one agent config is malformed").
#[derive(Debug, Clone)]
pub struct AgentLoadIssue {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of an agent-loading pass.
#[derive(Debug, Clone)]
pub struct AgentLoadReport {
    pub loaded: Vec<String>,
    pub issues: Vec<AgentLoadIssue>,
}

/// The supervisor's constructed context: configuration root, skill
/// registry, skill builders, the swarm board, and the set of loaded agent
/// configurations. Built once at startup and shared (by reference) across
/// every task invocation.
pub struct SupervisorWorld {
    pub config: WardenConfig,
    pub registry: RwLock<SkillRegistry>,
    pub builders: SkillBuilderRegistry,
    pub swarm: SwarmCoordinator,
    agents: RwLock<HashMap<String, AgentConfig>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("io error preparing warden root: {0}")]
    Io(#[from] std::io::Error),
    #[error("swarm board error: {0}")]
    Swarm(#[from] warden_swarm::SwarmError),
}

impl SupervisorWorld {
    /// Create the directory layout, discover skills, open the swarm board,
    /// and load every agent manifest under `config.models_dir`.
    pub fn bootstrap(config: WardenConfig) -> Result<Self, BootstrapError> {
        config.ensure_dirs()?;
        let mut registry = SkillRegistry::new(config.skills_dir.clone());
        registry.discover();
        let swarm = SwarmCoordinator::open(&config.swarm_dir)?;

        let world = SupervisorWorld {
            registry: RwLock::new(registry),
            builders: SkillBuilderRegistry::with_builtins(),
            swarm,
            agents: RwLock::new(HashMap::new()),
            config,
        };
        world.load_agents();
        Ok(world)
    }

    /// Rescan `models_dir` for `*.yml|*.yaml|*.json`, replacing the
    /// in-memory agent table. Bad files are skipped with a logged issue
    /// rather than aborting the scan (§4.7).
    pub fn load_agents(&self) -> AgentLoadReport {
        let mut loaded = Vec::new();
        let mut issues = Vec::new();
        let mut table = HashMap::new();

        let entries = match std::fs::read_dir(&self.config.models_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %self.config.models_dir.display(), %err, "failed to read models directory");
                return AgentLoadReport { loaded, issues };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_manifest = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yml") | Some("yaml") | Some("json")
            );
            if !is_manifest {
                continue;
            }

            match AgentConfig::load(&path) {
                Ok(config) => {
                    for warning in &config.warnings {
                        tracing::warn!(agent = %config.name, %warning, "capability validation warning");
                    }
                    loaded.push(config.name.clone());
                    table.insert(config.name.clone(), config);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping malformed agent manifest");
                    issues.push(AgentLoadIssue {
                        path,
                        error: agent_load_error_message(&err),
                    });
                }
            }
        }

        *self.agents.write() = table;
        AgentLoadReport { loaded, issues }
    }

    pub fn get_agent(&self, name: &str) -> Option<AgentConfig> {
        self.agents.read().get(name).cloned()
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// `open_sandbox`/`open_memory`/`open_log` build fresh handles per call
    /// rather than caching them: each layers its own file lock (`fs2`) over
    /// the shared on-disk state, so repeated opens from concurrent tasks on
    /// the same agent still serialize correctly (§5) without a long-lived
    /// per-agent cache to invalidate.
    pub fn open_sandbox(&self, agent: &AgentConfig) -> Result<Sandbox, warden_sandbox::SandboxError> {
        let root = agent
            .sandbox_path
            .clone()
            .unwrap_or_else(|| self.config.sandboxes_dir.clone());
        Sandbox::create(&agent.name, root)
    }

    pub fn open_memory(&self, agent: &AgentConfig) -> Result<AgentMemory, warden_memory::MemoryError> {
        AgentMemory::open(&agent.name, &self.config.memory_dir, agent.memory_limit_bytes)
    }

    pub fn open_log(&self, agent: &AgentConfig) -> Result<ActionLog, warden_log::LogError> {
        ActionLog::open(&agent.name, &self.config.logs_dir)
    }

    /// `list_agents` introspection query (§6).
    pub fn list_agents(&self) -> Vec<AgentSummary> {
        self.agents
            .read()
            .values()
            .map(AgentSummary::from)
            .collect()
    }

    /// `agent_info(name)` introspection query (§6): the agent record plus
    /// memory stats and sandbox disk usage.
    pub fn agent_info(&self, name: &str) -> Option<AgentInfo> {
        let agent = self.get_agent(name)?;
        let memory_stats = self.open_memory(&agent).and_then(|m| m.stats()).ok();
        let disk_usage = self.open_sandbox(&agent).map(|s| s.disk_usage()).ok();
        Some(AgentInfo {
            summary: AgentSummary::from(&agent),
            memory_stats,
            disk_usage,
        })
    }

    /// `agent_logs(name, limit)` introspection query (§6).
    pub fn agent_logs(&self, name: &str, limit: usize) -> Result<Vec<warden_log::LogEntry>, warden_log::LogError> {
        let log = ActionLog::open(name, &self.config.logs_dir)?;
        log.recent(limit)
    }

    /// `check_capability(agent, tag)` introspection query (§6).
    pub fn check_capability(&self, agent: &str, tag: &str) -> CapabilityCheckResult {
        let Some(agent) = self.get_agent(agent) else {
            return CapabilityCheckResult {
                allowed: false,
                error: Some("unknown agent".to_string()),
            };
        };
        let Ok(tag) = warden_capability::CapabilityTag::new(tag) else {
            return CapabilityCheckResult {
                allowed: false,
                error: Some("malformed capability tag".to_string()),
            };
        };
        CapabilityCheckResult {
            allowed: agent.has_capability(&tag),
            error: None,
        }
    }

    /// `check_sandbox_access(agent, path)` introspection query (§6).
    pub fn check_sandbox_access(&self, agent: &str, path: impl AsRef<Path>) -> SandboxAccessResult {
        let Some(agent) = self.get_agent(agent) else {
            return SandboxAccessResult {
                allowed: false,
                error: Some("unknown agent".to_string()),
            };
        };
        match self.open_sandbox(&agent) {
            Ok(sandbox) => match sandbox.ensure_contained(path) {
                Ok(_) => SandboxAccessResult {
                    allowed: true,
                    error: None,
                },
                Err(err) => SandboxAccessResult {
                    allowed: false,
                    error: Some(err.to_string()),
                },
            },
            Err(err) => SandboxAccessResult {
                allowed: false,
                error: Some(err.to_string()),
            },
        }
    }

    /// `check_network_access(agent, target?)` introspection query (§6).
    pub fn check_network_access(&self, agent: &str, target: Option<&str>) -> NetworkAccessResult {
        let Some(agent) = self.get_agent(agent) else {
            return NetworkAccessResult {
                allowed: false,
                error: Some("unknown agent".to_string()),
                has_network_local: false,
                has_network_external: false,
                is_blocked: false,
            };
        };
        let is_blocked = has_tag(&agent, "network.none");
        let has_local = has_tag(&agent, "network.local");
        let has_external = has_tag(&agent, "network.external");

        let result = warden_executor::policy::evaluate_network_policy(&agent.capabilities, target);
        NetworkAccessResult {
            allowed: result.is_ok(),
            error: result.err().map(|err| err.to_string()),
            has_network_local: has_local,
            has_network_external: has_external,
            is_blocked,
        }
    }

    /// `validate_all` introspection query (§6): per-agent capability
    /// validation plus the registry's own discovery report, matching the
    /// source's `validate_all()`.
    pub fn validate_all(&self) -> ValidateAllReport {
        let registry = self.registry.read();
        let agents = self.agents.read();
        let per_agent = agents
            .values()
            .map(|agent| {
                (
                    agent.name.clone(),
                    registry.validate_agent_skills(&agent.skills, &agent.capabilities),
                )
            })
            .collect();
        ValidateAllReport {
            per_agent,
            skill_stats: registry.stats(),
        }
    }

    /// `system_status` introspection query (§6).
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            models_dir: self.config.models_dir.clone(),
            skills_dir: self.config.skills_dir.clone(),
            sandboxes_dir: self.config.sandboxes_dir.clone(),
            memory_dir: self.config.memory_dir.clone(),
            logs_dir: self.config.logs_dir.clone(),
            swarm_dir: self.config.swarm_dir.clone(),
            agent_count: self.agents.read().len(),
            skill_count: self.registry.read().stats().total_skills,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Discover skill manifests again, replacing the registry's contents.
    /// Idempotent for an unchanged tree (§4.6).
    pub fn rediscover_skills(&self) -> DiscoveryReport {
        self.registry.write().discover()
    }

    /// `memory.shared`'s resolved wiring (§9): a skill function may read
    /// `target_agent`'s memory document, read-only, through the task
    /// engine only when *both* `acting_agent` and `target_agent` declare
    /// `memory.shared`. Absent that mutual declaration, access is refused.
    pub fn read_shared_memory(
        &self,
        acting_agent: &str,
        target_agent: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, SharedMemoryError> {
        let acting = self
            .get_agent(acting_agent)
            .ok_or(SharedMemoryError::UnknownAgent)?;
        let target = self
            .get_agent(target_agent)
            .ok_or(SharedMemoryError::UnknownAgent)?;

        if !has_tag(&acting, "memory.shared") || !has_tag(&target, "memory.shared") {
            return Err(SharedMemoryError::NotMutuallyShared);
        }

        self.open_memory(&target)
            .and_then(|memory| memory.load())
            .map_err(SharedMemoryError::Memory)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SharedMemoryError {
    #[error("unknown agent")]
    UnknownAgent,
    #[error("cross-agent memory access requires both agents to declare memory.shared")]
    NotMutuallyShared,
    #[error("memory error: {0}")]
    Memory(#[from] warden_memory::MemoryError),
}

fn agent_load_error_message(err: &AgentLoadError) -> String {
    err.to_string()
}

/// Check an agent's capability set against a raw tag string, treating a
/// malformed tag as absent rather than panicking — mirrors
/// `warden_executor::policy`'s internal `has()` helper.
fn has_tag(agent: &AgentConfig, raw: &str) -> bool {
    warden_capability::CapabilityTag::new(raw)
        .map(|tag| agent.has_capability(&tag))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub skills: Vec<String>,
}

impl From<&AgentConfig> for AgentSummary {
    fn from(agent: &AgentConfig) -> Self {
        let mut capabilities: Vec<String> = agent.capabilities.iter().map(|tag| tag.as_str().to_string()).collect();
        capabilities.sort();
        AgentSummary {
            name: agent.name.clone(),
            description: agent.description.clone(),
            capabilities,
            skills: agent.skills.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub summary: AgentSummary,
    pub memory_stats: Option<MemoryStats>,
    pub disk_usage: Option<DiskUsage>,
}

#[derive(Debug, Clone)]
pub struct CapabilityCheckResult {
    pub allowed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SandboxAccessResult {
    pub allowed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkAccessResult {
    pub allowed: bool,
    pub error: Option<String>,
    pub has_network_local: bool,
    pub has_network_external: bool,
    pub is_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct ValidateAllReport {
    pub per_agent: HashMap<String, warden_skills::AgentSkillValidation>,
    pub skill_stats: warden_skills::RegistryStats,
}

#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub models_dir: PathBuf,
    pub skills_dir: PathBuf,
    pub sandboxes_dir: PathBuf,
    pub memory_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub swarm_dir: PathBuf,
    pub agent_count: usize,
    pub skill_count: usize,
    pub version: String,
}
