//! Capability vocabulary and agent configuration for the agent supervisor.
//!
//! Every other crate in this workspace depends on this one for the closed
//! tag vocabulary (§4.1) and the [`AgentConfig`] type agents are loaded
//! into. Nothing here touches the filesystem except [`AgentConfig::load`].

pub mod agent;
pub mod presets;
pub mod tag;

pub use agent::{AgentConfig, AgentLoadError};
pub use tag::{CapabilityTag, Group};

/// Difference between a skill's required tags and an agent's granted tags.
///
/// Returns the required tags the agent does not hold, in the order given.
pub fn difference<'a>(
    required: impl IntoIterator<Item = &'a CapabilityTag>,
    granted: &std::collections::HashSet<CapabilityTag>,
) -> Vec<CapabilityTag> {
    required
        .into_iter()
        .filter(|tag| !granted.contains(*tag))
        .cloned()
        .collect()
}

/// Whether `agent` capabilities contain `cap`, after preset expansion has
/// already happened (callers hold an already-expanded set).
pub fn agent_has(cap: &CapabilityTag, granted: &std::collections::HashSet<CapabilityTag>) -> bool {
    granted.contains(cap)
}
