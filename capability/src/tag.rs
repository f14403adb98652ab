//! The closed capability vocabulary (§3, §4.1).

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// The group a capability tag belongs to (the part before the dot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Filesystem,
    Network,
    Exec,
    Memory,
    System,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Group::Filesystem => "filesystem",
            Group::Network => "network",
            Group::Exec => "exec",
            Group::Memory => "memory",
            Group::System => "system",
        };
        f.write_str(name)
    }
}

/// A `group.name` capability tag, compared by equality.
///
/// Construction through [`CapabilityTag::new`] does not reject unknown tags
/// — per §3, unknown tags are a validation warning at load time, never a
/// hard failure, and are never treated as granting permission. Use
/// [`CapabilityTag::is_known`] to check vocabulary membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTag(String);

impl CapabilityTag {
    /// Build a tag from a raw `group.name` string. Rejects only strings that
    /// are empty or that lack the `group.name` shape entirely.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidTagShape> {
        let raw = raw.into();
        if raw.split('.').count() != 2 || raw.starts_with('.') || raw.ends_with('.') {
            return Err(InvalidTagShape(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The group this tag's prefix names, if it matches a known group.
    pub fn group(&self) -> Option<Group> {
        match self.0.split_once('.')?.0 {
            "filesystem" => Some(Group::Filesystem),
            "network" => Some(Group::Network),
            "exec" => Some(Group::Exec),
            "memory" => Some(Group::Memory),
            "system" => Some(Group::System),
            _ => None,
        }
    }

    /// Whether this tag is a member of the closed vocabulary.
    pub fn is_known(&self) -> bool {
        vocabulary().contains(self.0.as_str())
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A string was not shaped like `group.name`.
#[derive(Debug, thiserror::Error)]
#[error("malformed capability tag: {0:?}")]
pub struct InvalidTagShape(String);

const VOCABULARY: &[&str] = &[
    "filesystem.read",
    "filesystem.write",
    "filesystem.exec",
    "filesystem.delete",
    "network.none",
    "network.local",
    "network.external",
    "exec.pkg",
    "exec.git",
    "exec.shell",
    "exec.python",
    "exec.build",
    "exec.analyze",
    "exec.compress",
    "exec.docker",
    "exec.qemu",
    "exec.iso",
    "exec.apk",
    "exec.custom",
    "memory.read",
    "memory.write",
    "memory.shared",
    "system.info",
    "system.process",
    "system.env",
];

fn vocabulary() -> &'static HashSet<&'static str> {
    static VOCAB: OnceLock<HashSet<&'static str>> = OnceLock::new();
    VOCAB.get_or_init(|| VOCABULARY.iter().copied().collect())
}

/// `validate(tag) -> bool` from §4.1: is this a member of the closed
/// vocabulary. Callers that already have a [`CapabilityTag`] should prefer
/// [`CapabilityTag::is_known`]; this free function accepts a raw string for
/// validating manifest input before a `CapabilityTag` is constructed.
pub fn validate(tag: &str) -> bool {
    vocabulary().contains(tag)
}

/// Every tag in the closed vocabulary, for diagnostics and tests.
pub fn all_tags() -> impl Iterator<Item = &'static str> {
    VOCABULARY.iter().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_validate() {
        assert!(validate("filesystem.read"));
        assert!(validate("network.none"));
        assert!(validate("exec.custom"));
    }

    #[test]
    fn unknown_tags_do_not_validate() {
        assert!(!validate("network.external2"));
        assert!(!validate("filesystem"));
        assert!(!validate(""));
    }

    #[test]
    fn tag_group_parses_prefix() {
        let tag = CapabilityTag::new("exec.git").unwrap();
        assert_eq!(tag.group(), Some(Group::Exec));
    }

    #[test]
    fn malformed_tag_shape_is_rejected() {
        assert!(CapabilityTag::new("no_dot").is_err());
        assert!(CapabilityTag::new(".leading").is_err());
        assert!(CapabilityTag::new("trailing.").is_err());
    }

    #[test]
    fn unknown_but_well_shaped_tag_constructs_but_is_not_known() {
        let tag = CapabilityTag::new("exec.made_up").unwrap();
        assert!(!tag.is_known());
    }
}
