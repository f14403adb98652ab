//! Skill manifest discovery, registry, and the statically-linked skill
//! trait/builder registry (§4.6).
//!
//! Grounded on `agents/core/registry/skill_registry.py`,
//! `agents/skills/loader.py`, and `agents/skills/base.py`. The source's
//! dynamic-import loader narrows here to a static builder table, since
//! Rust skills compile into the binary rather than being discovered as
//! files at runtime (see `builder.rs`); manifest discovery and validation
//! otherwise follow the source closely.

pub mod builder;
pub mod fs_skill;
pub mod manifest;
pub mod pkg_skill;
pub mod registry;
pub mod skill_trait;

pub use builder::{SkillBuilder, SkillBuilderRegistry};
pub use manifest::{find_manifest, load_manifest, ManifestLoadError, SkillManifest, SkillManifestDto};
pub use registry::{
    AgentSkillValidation, DiscoveryError, DiscoveryReport, RegistryStats, SkillIssue, SkillRegistry,
};
pub use skill_trait::{CallLog, Skill, SkillContext, SkillOutcome};
