//! The statically-linked skill builder registry.
//!
//! The source loads skill implementations dynamically via
//! `importlib.util.spec_from_file_location` (`agents/skills/loader.py`'s
//! `SkillLoader.load_skill_class`). Rust links every skill's code into the
//! binary at compile time, so the loader's role narrows to a lookup table
//! from skill name to a constructor function — still populated the way the
//! source populates `_skill_classes`, just without the dynamic import step.

use std::collections::HashMap;

use crate::fs_skill::FsSkill;
use crate::pkg_skill::PkgSkill;
use crate::skill_trait::{Skill, SkillContext};

/// Higher-ranked so a single function pointer can build a skill borrowing
/// from a [`SkillContext`] of any lifetime.
pub type SkillBuilder = for<'a> fn(&SkillContext<'a>) -> Box<dyn Skill + 'a>;

/// Maps skill names to their constructors.
pub struct SkillBuilderRegistry {
    builders: HashMap<&'static str, SkillBuilder>,
}

impl SkillBuilderRegistry {
    pub fn new() -> Self {
        SkillBuilderRegistry {
            builders: HashMap::new(),
        }
    }

    /// A registry preloaded with every skill shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("fs", |ctx| Box::new(FsSkill::new(ctx)));
        registry.register("pkg", |ctx| Box::new(PkgSkill::new(ctx)));
        registry
    }

    pub fn register(&mut self, name: &'static str, builder: SkillBuilder) {
        self.builders.insert(name, builder);
    }

    pub fn known_skills(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.builders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build a skill instance bound to `ctx`, or `None` if no builder is
    /// registered under `name`.
    pub fn build<'a>(&self, name: &str, ctx: &SkillContext<'a>) -> Option<Box<dyn Skill + 'a>> {
        self.builders.get(name).map(|builder| builder(ctx))
    }
}

impl Default for SkillBuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_executor::GatedExecutor;
    use warden_memory::AgentMemory;
    use warden_sandbox::Sandbox;

    #[test]
    fn builtins_include_fs_and_pkg() {
        let registry = SkillBuilderRegistry::with_builtins();
        assert_eq!(registry.known_skills(), vec!["fs", "pkg"]);
    }

    #[test]
    fn build_resolves_registered_skill_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::create("scout", dir.path()).unwrap();
        let memory = AgentMemory::open("scout", dir.path().join("memory"), 1_048_576).unwrap();
        let executor = GatedExecutor::new("scout", Default::default(), sandbox.root(), 60);
        let ctx = SkillContext {
            executor: &executor,
            sandbox: &sandbox,
            memory: &memory,
        };

        let registry = SkillBuilderRegistry::with_builtins();
        let skill = registry.build("fs", &ctx).unwrap();
        assert_eq!(skill.name(), "fs");
        assert!(registry.build("nonexistent", &ctx).is_none());
    }
}
