//! Skill manifest parsing and validation (§4.6, §3 Skill Manifest).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warden_capability::CapabilityTag;

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_sandbox_safe() -> bool {
    true
}

/// On-disk manifest shape, as a skill author writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillManifestDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires_capabilities: Vec<String>,
    #[serde(default = "default_sandbox_safe")]
    pub sandbox_safe: bool,
}

/// A skill manifest as discovered on disk, with its validation outcome.
///
/// Invalid manifests are retained (not dropped) so the registry can report
/// on them for diagnostics, matching §4.6's "retained ... for diagnostics"
/// requirement.
#[derive(Debug, Clone)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    pub version: String,
    pub provides: Vec<String>,
    pub requires_capabilities: Vec<String>,
    pub sandbox_safe: bool,
    /// Directory the manifest was loaded from.
    pub path: PathBuf,
    pub valid: bool,
    pub validation_errors: Vec<String>,
}

impl SkillManifest {
    fn from_dto(dto: SkillManifestDto, path: PathBuf) -> Self {
        SkillManifest {
            name: dto.name,
            description: dto.description,
            version: dto.version,
            provides: dto.provides,
            requires_capabilities: dto.requires_capabilities,
            sandbox_safe: dto.sandbox_safe,
            path,
            valid: true,
            validation_errors: Vec::new(),
        }
    }

    /// Required capabilities the agent doesn't grant. Skips tags that
    /// aren't well-shaped `group.name` strings — those already appear in
    /// `validation_errors` and can never be satisfied.
    pub fn missing_capabilities(&self, granted: &std::collections::HashSet<CapabilityTag>) -> Vec<String> {
        self.requires_capabilities
            .iter()
            .filter(|raw| {
                CapabilityTag::new((*raw).clone())
                    .map(|tag| !granted.contains(&tag))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Validate against §3/§4.6/§8's invariants: `name` matches the
    /// directory it was discovered in; `provides` non-empty; every
    /// capability tag is in the vocabulary; `network.external` is
    /// forbidden; an implementation marker exists beside the manifest.
    ///
    /// Because skills are linked statically rather than loaded as modules
    /// (§9's design note), the source's "skill.py exists" check becomes a
    /// check for a `skill.rs` file beside the manifest — the on-disk
    /// evidence that an implementation was written for this skill,
    /// independent of whether a builder happens to be registered for it.
    fn validate(&mut self, directory_name: &str) {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("missing required field: name".to_string());
        } else if self.name != directory_name {
            errors.push(format!(
                "manifest name {:?} does not match skill directory {:?}",
                self.name, directory_name
            ));
        }

        if self.provides.is_empty() {
            errors.push("missing required field: provides (list of functions)".to_string());
        }

        for cap in &self.requires_capabilities {
            match CapabilityTag::new(cap.clone()) {
                Ok(tag) if tag.is_known() => {}
                Ok(_) => errors.push(format!("unknown capability: {cap:?}")),
                Err(_) => errors.push(format!("malformed capability tag: {cap:?}")),
            }
        }

        if self
            .requires_capabilities
            .iter()
            .any(|cap| cap == "network.external")
        {
            errors.push("skills cannot require network.external (offline mode)".to_string());
        }

        if !self.path.join("skill.rs").exists() {
            errors.push("missing skill.rs implementation marker file".to_string());
        }

        self.validation_errors = errors;
        self.valid = self.validation_errors.is_empty();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestLoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse skill manifest {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse skill manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Locate a skill's manifest file, preferring `skill.yml` over `skill.yaml`
/// over `skill.json` (§9's resolved open question).
pub fn find_manifest(skill_dir: &Path) -> Option<PathBuf> {
    for name in ["skill.yml", "skill.yaml", "skill.json"] {
        let candidate = skill_dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Load and validate the manifest found in `skill_dir`, whose own name is
/// `directory_name`.
pub fn load_manifest(skill_dir: &Path, directory_name: &str) -> Result<SkillManifest, ManifestLoadError> {
    let path = find_manifest(skill_dir).ok_or_else(|| {
        ManifestLoadError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no manifest file found (skill.yml, skill.yaml, or skill.json)",
        ))
    })?;

    let raw = std::fs::read_to_string(&path)?;
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");

    let dto: SkillManifestDto = if is_json {
        serde_json::from_str(&raw).map_err(|source| ManifestLoadError::Json {
            path: path.clone(),
            source,
        })?
    } else {
        serde_yaml::from_str(&raw).map_err(|source| ManifestLoadError::Yaml {
            path: path.clone(),
            source,
        })?
    };

    let mut manifest = SkillManifest::from_dto(dto, skill_dir.to_path_buf());
    manifest.validate(directory_name);
    Ok(manifest)
}
