//! Skill manifest discovery and lookup (§4.6), grounded on
//! `agents/core/registry/skill_registry.py`'s `SkillRegistry`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use warden_capability::CapabilityTag;

use crate::manifest::{self, SkillManifest};

#[derive(Debug, Clone)]
pub struct DiscoveryError {
    pub skill: String,
    pub error: String,
}

/// Summary of a [`SkillRegistry::discover`] pass.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub discovered_at: DateTime<Utc>,
    pub skills_dir: PathBuf,
    pub total_discovered: usize,
    pub valid: usize,
    pub invalid: usize,
    pub discovery_errors: Vec<DiscoveryError>,
}

#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_skills: usize,
    pub valid_skills: usize,
    pub invalid_skills: usize,
    pub unique_capabilities_used: usize,
    pub total_functions_provided: usize,
}

#[derive(Debug, Clone)]
pub enum SkillIssue {
    SkillNotFound,
    SkillInvalid { errors: Vec<String> },
    MissingCapabilities { missing: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct AgentSkillValidation {
    pub valid: bool,
    pub valid_skills: Vec<String>,
    pub issues: Vec<(String, SkillIssue)>,
}

/// Discovers and indexes skill manifests under a skills directory.
///
/// Manifests that fail validation are retained, not dropped — §4.6 treats
/// an invalid skill as something to report and skip at load time, not
/// something to erase from the registry's knowledge.
pub struct SkillRegistry {
    skills_dir: PathBuf,
    manifests: HashMap<String, SkillManifest>,
    discovery_errors: Vec<DiscoveryError>,
    discovered_at: Option<DateTime<Utc>>,
}

impl SkillRegistry {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        SkillRegistry {
            skills_dir: skills_dir.into(),
            manifests: HashMap::new(),
            discovery_errors: Vec::new(),
            discovered_at: None,
        }
    }

    /// Scan `skills_dir` for subdirectories (skipping names starting with
    /// `_` or `.`), load each one's manifest, validate it, and index it by
    /// manifest name.
    pub fn discover(&mut self) -> DiscoveryReport {
        self.manifests.clear();
        self.discovery_errors.clear();
        self.discovered_at = Some(Utc::now());

        if !self.skills_dir.exists() {
            warn!(skills_dir = %self.skills_dir.display(), "skills directory not found");
            return self.report();
        }

        let entries = match std::fs::read_dir(&self.skills_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(skills_dir = %self.skills_dir.display(), %err, "failed to read skills directory");
                return self.report();
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.discovery_errors.push(DiscoveryError {
                        skill: "<unreadable>".to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let directory_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if directory_name.starts_with('_') || directory_name.starts_with('.') {
                continue;
            }

            if manifest::find_manifest(&path).is_none() {
                self.discovery_errors.push(DiscoveryError {
                    skill: directory_name,
                    error: "no manifest file found (skill.yml, skill.yaml, or skill.json)".to_string(),
                });
                continue;
            }

            match manifest::load_manifest(&path, &directory_name) {
                Ok(loaded) => {
                    debug!(skill = %loaded.name, valid = loaded.valid, "registered skill");
                    self.manifests.insert(loaded.name.clone(), loaded);
                }
                Err(err) => self.discovery_errors.push(DiscoveryError {
                    skill: directory_name,
                    error: err.to_string(),
                }),
            }
        }

        self.report()
    }

    fn report(&self) -> DiscoveryReport {
        let valid = self.manifests.values().filter(|m| m.valid).count();
        DiscoveryReport {
            discovered_at: self.discovered_at.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
            skills_dir: self.skills_dir.clone(),
            total_discovered: self.manifests.len(),
            valid,
            invalid: self.manifests.len() - valid,
            discovery_errors: self.discovery_errors.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SkillManifest> {
        self.manifests.get(name)
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.manifests.contains_key(name)
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.manifests.get(name).map(|m| m.valid).unwrap_or(false)
    }

    pub fn list_valid(&self) -> Vec<&SkillManifest> {
        self.manifests.values().filter(|m| m.valid).collect()
    }

    pub fn list_invalid(&self) -> Vec<&SkillManifest> {
        self.manifests.values().filter(|m| !m.valid).collect()
    }

    pub fn find_by_capability(&self, capability: &str) -> Vec<&str> {
        self.manifests
            .values()
            .filter(|m| m.requires_capabilities.iter().any(|cap| cap == capability))
            .map(|m| m.name.as_str())
            .collect()
    }

    pub fn find_by_function(&self, function_name: &str) -> Vec<&str> {
        self.manifests
            .values()
            .filter(|m| m.provides.iter().any(|f| f == function_name))
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Check that an agent's declared skills exist, are valid, and that
    /// its capability set covers every capability each skill requires.
    pub fn validate_agent_skills(
        &self,
        agent_skills: &[String],
        agent_capabilities: &HashSet<CapabilityTag>,
    ) -> AgentSkillValidation {
        let mut issues = Vec::new();
        let mut valid_skills = Vec::new();

        for skill_name in agent_skills {
            let Some(manifest) = self.manifests.get(skill_name) else {
                issues.push((skill_name.clone(), SkillIssue::SkillNotFound));
                continue;
            };

            if !manifest.valid {
                issues.push((
                    skill_name.clone(),
                    SkillIssue::SkillInvalid {
                        errors: manifest.validation_errors.clone(),
                    },
                ));
                continue;
            }

            let missing = manifest.missing_capabilities(agent_capabilities);
            if missing.is_empty() {
                valid_skills.push(skill_name.clone());
            } else {
                issues.push((skill_name.clone(), SkillIssue::MissingCapabilities { missing }));
            }
        }

        AgentSkillValidation {
            valid: issues.is_empty(),
            valid_skills,
            issues,
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let mut unique_capabilities = HashSet::new();
        let mut total_functions = 0;
        for manifest in self.manifests.values() {
            unique_capabilities.extend(manifest.requires_capabilities.iter().cloned());
            total_functions += manifest.provides.len();
        }
        let valid = self.manifests.values().filter(|m| m.valid).count();
        RegistryStats {
            total_skills: self.manifests.len(),
            valid_skills: valid,
            invalid_skills: self.manifests.len() - valid,
            unique_capabilities_used: unique_capabilities.len(),
            total_functions_provided: total_functions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(skills_dir: &std::path::Path, name: &str, manifest_body: &str) {
        let dir = skills_dir.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("skill.yml"), manifest_body).unwrap();
        fs::write(dir.join("skill.rs"), "// marker").unwrap();
    }

    #[test]
    fn discover_indexes_valid_and_invalid_skills() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "fs",
            "name: fs\nprovides:\n  - list_dir\nrequires_capabilities:\n  - filesystem.read\n",
        );
        write_skill(dir.path(), "broken", "name: broken\n");

        let mut registry = SkillRegistry::new(dir.path());
        let report = registry.discover();

        assert_eq!(report.total_discovered, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
        assert!(registry.is_valid("fs"));
        assert!(!registry.is_valid("broken"));
    }

    #[test]
    fn find_by_capability_and_function() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "fs",
            "name: fs\nprovides:\n  - list_dir\nrequires_capabilities:\n  - filesystem.read\n",
        );

        let mut registry = SkillRegistry::new(dir.path());
        registry.discover();

        assert_eq!(registry.find_by_capability("filesystem.read"), vec!["fs"]);
        assert_eq!(registry.find_by_function("list_dir"), vec!["fs"]);
        assert!(registry.find_by_capability("filesystem.write").is_empty());
    }

    #[test]
    fn validate_agent_skills_reports_missing_capability() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "fs",
            "name: fs\nprovides:\n  - list_dir\nrequires_capabilities:\n  - filesystem.read\n",
        );

        let mut registry = SkillRegistry::new(dir.path());
        registry.discover();

        let result = registry.validate_agent_skills(&["fs".to_string()], &HashSet::new());
        assert!(!result.valid);
        assert!(matches!(
            result.issues[0].1,
            SkillIssue::MissingCapabilities { .. }
        ));
    }

    #[test]
    fn validate_agent_skills_passes_with_capability_granted() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "fs",
            "name: fs\nprovides:\n  - list_dir\nrequires_capabilities:\n  - filesystem.read\n",
        );

        let mut registry = SkillRegistry::new(dir.path());
        registry.discover();

        let granted: HashSet<CapabilityTag> = ["filesystem.read"]
            .iter()
            .map(|tag| CapabilityTag::new(*tag).unwrap())
            .collect();
        let result = registry.validate_agent_skills(&["fs".to_string()], &granted);
        assert!(result.valid);
        assert_eq!(result.valid_skills, vec!["fs".to_string()]);
    }

    #[test]
    fn unknown_skill_name_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::new(dir.path());
        let result = registry.validate_agent_skills(&["ghost".to_string()], &HashSet::new());
        assert!(!result.valid);
        assert!(matches!(result.issues[0].1, SkillIssue::SkillNotFound));
    }
}
