//! Network policy enforcement (§4.1).
//!
//! The source checks only whether an agent has *some* network capability
//! before running a network-classified binary; it never distinguishes
//! `network.local` from `network.external` by target. This spec requires
//! that distinction, so this module is new relative to the source: it
//! resolves a best-effort host from the caller-supplied target string (a
//! URL, a bare host, a `user@host` remote spec, or a `host:port` pair) and
//! classifies it as loopback or not.

use std::collections::HashSet;
use std::net::IpAddr;

use warden_capability::CapabilityTag;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct NetworkPolicyViolation {
    pub reason: String,
}

impl NetworkPolicyViolation {
    fn new(reason: impl Into<String>) -> Self {
        NetworkPolicyViolation {
            reason: reason.into(),
        }
    }
}

fn has(capabilities: &HashSet<CapabilityTag>, tag: &str) -> bool {
    CapabilityTag::new(tag)
        .map(|tag| capabilities.contains(&tag))
        .unwrap_or(false)
}

/// Apply the §4.1 network policy for a network-classified command.
///
/// `target`, if given, is a best-effort hint (a URL, bare hostname, or
/// `user@host`/`host:port` remote spec) used only to tell loopback targets
/// apart from everything else. A missing target is treated as "unknown,
/// assume remote" — it cannot be vouched for under `network.local` alone.
pub fn evaluate_network_policy(
    capabilities: &HashSet<CapabilityTag>,
    target: Option<&str>,
) -> Result<(), NetworkPolicyViolation> {
    if has(capabilities, "network.none") {
        return Err(NetworkPolicyViolation::new(
            "network access denied: agent has network.none",
        ));
    }

    let local = has(capabilities, "network.local");
    let external = has(capabilities, "network.external");

    if let Some(host) = target.and_then(extract_host) {
        if is_loopback_host(&host) {
            if local || external {
                return Ok(());
            }
            return Err(NetworkPolicyViolation::new(
                "network access denied: agent has no network capability",
            ));
        }
    }

    if external {
        Ok(())
    } else if local {
        Err(NetworkPolicyViolation::new(
            "network access denied: network.local only permits loopback targets",
        ))
    } else {
        Err(NetworkPolicyViolation::new(
            "network access denied: agent has no network capability",
        ))
    }
}

/// Pull a bare host out of a URL, `user@host`, or `host:port` string.
/// Best-effort: returns `None` for anything unrecognizable rather than
/// guessing.
fn extract_host(target: &str) -> Option<String> {
    let without_scheme = target.split_once("://").map(|(_, rest)| rest).unwrap_or(target);
    let without_path = without_scheme.split(['/', '?', '#']).next().unwrap_or(without_scheme);
    let without_userinfo = without_path.rsplit_once('@').map(|(_, host)| host).unwrap_or(without_path);

    if without_userinfo.is_empty() {
        return None;
    }

    // IPv6 literal in brackets, e.g. `[::1]:22`.
    if let Some(rest) = without_userinfo.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return Some(host.to_string());
        }
    }

    let host = without_userinfo.split(':').next().unwrap_or(without_userinfo);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Whether `host` names a loopback address: `localhost`, `127.0.0.0/8`, or
/// `::1`.
pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|addr| addr.is_loopback())
        .unwrap_or(false)
}
