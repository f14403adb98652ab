//! Agent configuration: the manifest an agent is loaded from (§3, §6).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::presets;
use crate::tag::CapabilityTag;

const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 1_048_576;
const DEFAULT_MAX_TASK_TIMEOUT_SECONDS: u64 = 3600;

fn default_memory_limit_bytes() -> u64 {
    DEFAULT_MEMORY_LIMIT_BYTES
}

fn default_max_task_timeout_seconds() -> u64 {
    DEFAULT_MAX_TASK_TIMEOUT_SECONDS
}

fn default_memory_backend() -> String {
    "file".to_string()
}

/// On-disk manifest shape (§6), field names as an operator writes them.
///
/// Field names here intentionally differ from [`AgentConfig`]'s internal
/// names (`max_memory_bytes` vs `memory_limit_bytes`, `max_task_timeout` vs
/// `max_task_timeout_seconds`) — the manifest is an external interface and
/// keeps the vocabulary a human writing YAML expects; the internal struct
/// keeps the unit in the field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifestDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub presets: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_memory_backend")]
    pub memory_backend: String,
    #[serde(default)]
    pub sandbox_path: Option<PathBuf>,
    #[serde(default = "default_memory_limit_bytes")]
    pub max_memory_bytes: u64,
    #[serde(default = "default_max_task_timeout_seconds")]
    pub max_task_timeout: u64,
}

/// A loaded, validated agent configuration.
///
/// Unknown capability tags and preset names are recorded in
/// [`AgentConfig::warnings`] rather than rejected — §3 treats vocabulary
/// membership as a load-time warning, not a hard failure, so an agent can
/// still run with a manifest written against a newer or older vocabulary.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub capabilities: HashSet<CapabilityTag>,
    pub skills: Vec<String>,
    pub memory_backend: String,
    pub sandbox_path: Option<PathBuf>,
    pub memory_limit_bytes: u64,
    pub max_task_timeout_seconds: u64,
    /// Human-readable warnings collected while loading: unknown tags,
    /// unknown presets, malformed tag shapes.
    pub warnings: Vec<String>,
}

/// Failure to load an agent manifest from disk.
#[derive(Debug, thiserror::Error)]
pub enum AgentLoadError {
    #[error("failed to read agent manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse agent manifest {path} as YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse agent manifest {path} as JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("agent manifest {path} has no recognized extension (expected .yml, .yaml, or .json)")]
    UnknownExtension { path: PathBuf },
}

impl AgentConfig {
    /// Load and validate an agent manifest from a YAML or JSON file.
    ///
    /// Extension selects the parser: `.yml`/`.yaml` parse as YAML, `.json`
    /// parses as JSON. Any other extension is rejected before the file is
    /// even read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentLoadError> {
        let path = path.as_ref();
        let is_json = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => false,
            Some("json") => true,
            _ => {
                return Err(AgentLoadError::UnknownExtension {
                    path: path.to_path_buf(),
                })
            }
        };

        let raw = std::fs::read_to_string(path).map_err(|source| AgentLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let dto: AgentManifestDto = if is_json {
            serde_json::from_str(&raw).map_err(|source| AgentLoadError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_yaml::from_str(&raw).map_err(|source| AgentLoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };

        Ok(Self::from_dto(dto))
    }

    /// Build a validated [`AgentConfig`] from an already-parsed manifest,
    /// expanding presets and collecting validation warnings.
    pub fn from_dto(dto: AgentManifestDto) -> Self {
        let mut warnings = Vec::new();
        let mut capabilities = HashSet::new();

        for preset_name in &dto.presets {
            match presets::expand_preset(preset_name) {
                Some(tags) => capabilities.extend(tags),
                None => warnings.push(format!("unknown capability preset: {preset_name:?}")),
            }
        }

        for raw in &dto.capabilities {
            match CapabilityTag::new(raw.clone()) {
                Ok(tag) => {
                    if !tag.is_known() {
                        warnings.push(format!("unknown capability tag: {raw:?}"));
                    }
                    capabilities.insert(tag);
                }
                Err(_) => warnings.push(format!("malformed capability tag: {raw:?}")),
            }
        }

        AgentConfig {
            name: dto.name,
            description: dto.description,
            capabilities,
            skills: dto.skills,
            memory_backend: dto.memory_backend,
            sandbox_path: dto.sandbox_path,
            memory_limit_bytes: dto.max_memory_bytes,
            max_task_timeout_seconds: dto.max_task_timeout,
            warnings,
        }
    }

    pub fn has_capability(&self, tag: &CapabilityTag) -> bool {
        self.capabilities.contains(tag)
    }
}

impl Default for AgentManifestDto {
    fn default() -> Self {
        AgentManifestDto {
            name: String::new(),
            description: String::new(),
            capabilities: Vec::new(),
            presets: Vec::new(),
            skills: Vec::new(),
            memory_backend: default_memory_backend(),
            sandbox_path: None,
            max_memory_bytes: default_memory_limit_bytes(),
            max_task_timeout: default_max_task_timeout_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_yaml_manifest_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "name: scout\ncapabilities:\n  - filesystem.read\n  - memory.read\nskills:\n  - grep_tool\n"
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.name, "scout");
        assert_eq!(config.memory_limit_bytes, DEFAULT_MEMORY_LIMIT_BYTES);
        assert_eq!(config.max_task_timeout_seconds, DEFAULT_MAX_TASK_TIMEOUT_SECONDS);
        assert_eq!(config.memory_backend, "file");
        assert!(config.has_capability(&CapabilityTag::new("filesystem.read").unwrap()));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn unknown_capability_tag_produces_warning_not_error() {
        let dto = AgentManifestDto {
            name: "probe".to_string(),
            capabilities: vec!["network.quantum".to_string()],
            ..AgentManifestDto::default()
        };
        let config = AgentConfig::from_dto(dto);
        assert_eq!(config.warnings.len(), 1);
        assert!(config.has_capability(&CapabilityTag::new("network.quantum").unwrap()));
    }

    #[test]
    fn preset_expands_into_capabilities() {
        let dto = AgentManifestDto {
            name: "reader".to_string(),
            presets: vec!["readonly".to_string()],
            ..AgentManifestDto::default()
        };
        let config = AgentConfig::from_dto(dto);
        assert!(config.has_capability(&CapabilityTag::new("filesystem.read").unwrap()));
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn unknown_preset_name_produces_warning() {
        let dto = AgentManifestDto {
            name: "ghost".to_string(),
            presets: vec!["nonexistent".to_string()],
            ..AgentManifestDto::default()
        };
        let config = AgentConfig::from_dto(dto);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn unrecognized_extension_is_rejected_before_reading() {
        let err = AgentConfig::load("/tmp/does-not-matter.toml").unwrap_err();
        assert!(matches!(err, AgentLoadError::UnknownExtension { .. }));
    }
}
