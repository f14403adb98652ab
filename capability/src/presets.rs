//! Named capability presets (§3: "Presets are named sets of tags; they
//! expand at load time").
//!
//! The source this system was distilled from has no preset layer of its
//! own — agent manifests list raw tags. This implementation adds a small,
//! fixed set of presets covering the common agent shapes seen across the
//! manifests in `original_source/agents/models/`, so a manifest can write
//! `presets: [readonly]` instead of repeating the same four tags. Presets
//! expand into raw tags before validation; an unknown preset name is
//! treated the same as an unknown tag (a warning, not a load failure).

use std::collections::HashSet;

use crate::tag::CapabilityTag;

/// Expand a preset name into its constituent tags. Returns `None` if the
/// name is not a known preset.
pub fn expand_preset(name: &str) -> Option<HashSet<CapabilityTag>> {
    let raw: &[&str] = match name {
        "readonly" => &["filesystem.read", "memory.read", "system.info"],
        "diagnostics" => &["filesystem.read", "system.info", "system.process", "memory.read"],
        "sandboxed_build" => &[
            "filesystem.read",
            "filesystem.write",
            "exec.build",
            "exec.shell",
            "network.none",
        ],
        "offline_worker" => &[
            "filesystem.read",
            "filesystem.write",
            "memory.read",
            "memory.write",
            "network.none",
        ],
        _ => return None,
    };
    Some(
        raw.iter()
            .map(|tag| CapabilityTag::new(*tag).expect("preset tags are well-formed"))
            .collect(),
    )
}

/// Every preset name this implementation knows about.
pub fn known_presets() -> impl Iterator<Item = &'static str> {
    ["readonly", "diagnostics", "sandboxed_build", "offline_worker"].into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_preset_expands_to_known_tags() {
        let expanded = expand_preset("readonly").unwrap();
        assert!(expanded.contains(&CapabilityTag::new("filesystem.read").unwrap()));
        assert!(expanded.iter().all(|tag| tag.is_known()));
    }

    #[test]
    fn unknown_preset_expands_to_none() {
        assert!(expand_preset("not_a_real_preset").is_none());
    }
}
