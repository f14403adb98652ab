//! Semantic emit helpers (§4.8 supplement), grounded on
//! `agents/core/swarm/signals.py`'s `SignalEmitter`. Each method is a
//! fixed `(strength?, ttl)` policy over [`SwarmCoordinator::emit`] — no
//! policy decisions live here beyond the constants the source hard-codes.

use chrono::Utc;
use serde_json::{json, Value};

use crate::board::{SwarmCoordinator, SwarmError};
use crate::signal::{Signal, SignalType};

const BLOCKED_TTL: i64 = 7200;
const DANGER_TTL: i64 = 86_400;
const RELEASE_TTL: i64 = 60;
const WORKING_TTL: i64 = 120;
const HELP_TTL: i64 = 1800;
const DISCOVERY_TTL: i64 = 43_200;
const DEPRECATION_TTL: i64 = 86_400;
const DEFAULT_TTL: i64 = 3600;

/// Emits signals on behalf of one agent.
pub struct SignalEmitter<'a> {
    coordinator: &'a SwarmCoordinator,
    agent_name: String,
}

impl<'a> SignalEmitter<'a> {
    pub fn new(coordinator: &'a SwarmCoordinator, agent_name: impl Into<String>) -> Self {
        SignalEmitter {
            coordinator,
            agent_name: agent_name.into(),
        }
    }

    pub fn report_success(&self, target: &str, details: Value) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Success,
            &self.agent_name,
            target,
            json!({"details": details, "timestamp": Utc::now().timestamp()}),
            1.0,
            DEFAULT_TTL,
        )
    }

    pub fn report_failure(&self, target: &str, error: Option<&str>, recoverable: bool) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Failure,
            &self.agent_name,
            target,
            json!({"error": error, "recoverable": recoverable, "timestamp": Utc::now().timestamp()}),
            1.0,
            DEFAULT_TTL,
        )
    }

    pub fn report_blocked(&self, target: &str, reason: Option<&str>) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Blocked,
            &self.agent_name,
            target,
            json!({"reason": reason, "timestamp": Utc::now().timestamp()}),
            1.0,
            BLOCKED_TTL,
        )
    }

    pub fn report_danger(&self, target: &str, severity: &str, description: Option<&str>) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Danger,
            &self.agent_name,
            target,
            json!({"severity": severity, "description": description, "timestamp": Utc::now().timestamp()}),
            1.0,
            DANGER_TTL,
        )
    }

    /// Claim expires after twice the estimated duration.
    pub fn claim_task(&self, target: &str, estimated_duration_seconds: i64) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Claiming,
            &self.agent_name,
            target,
            json!({"estimated_duration": estimated_duration_seconds, "started_at": Utc::now().timestamp()}),
            1.0,
            estimated_duration_seconds * 2,
        )
    }

    pub fn release_task(&self, target: &str, reason: &str) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Releasing,
            &self.agent_name,
            target,
            json!({"reason": reason, "timestamp": Utc::now().timestamp()}),
            1.0,
            RELEASE_TTL,
        )
    }

    pub fn report_working(&self, target: &str) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Working,
            &self.agent_name,
            target,
            json!({"timestamp": Utc::now().timestamp()}),
            1.0,
            WORKING_TTL,
        )
    }

    pub fn request_help(&self, target: &str, problem: Option<&str>, needed_capabilities: &[String]) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::HelpNeeded,
            &self.agent_name,
            target,
            json!({"problem": problem, "needed_capabilities": needed_capabilities, "timestamp": Utc::now().timestamp()}),
            1.0,
            HELP_TTL,
        )
    }

    pub fn share_discovery(&self, target: &str, discovery_type: &str, details: Value) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Learned,
            &self.agent_name,
            target,
            json!({"discovery_type": discovery_type, "details": details, "timestamp": Utc::now().timestamp()}),
            1.0,
            DISCOVERY_TTL,
        )
    }

    pub fn report_optimization(&self, target: &str, improvement: &str, metrics: Value) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Optimized,
            &self.agent_name,
            target,
            json!({"improvement": improvement, "metrics": metrics, "timestamp": Utc::now().timestamp()}),
            1.0,
            DEFAULT_TTL,
        )
    }

    pub fn mark_deprecated(&self, target: &str, reason: &str, replacement: Option<&str>) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::Deprecated,
            &self.agent_name,
            target,
            json!({"reason": reason, "replacement": replacement, "timestamp": Utc::now().timestamp()}),
            1.0,
            DEPRECATION_TTL,
        )
    }

    pub fn report_resource(&self, target: &str, resource_type: &str, location: Option<&str>, metadata: Value) -> Result<Signal, SwarmError> {
        self.coordinator.emit(
            SignalType::ResourceFound,
            &self.agent_name,
            target,
            json!({"resource_type": resource_type, "location": location, "metadata": metadata, "timestamp": Utc::now().timestamp()}),
            1.0,
            DEFAULT_TTL,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_task_ttl_is_twice_the_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        let emitter = SignalEmitter::new(&board, "build_agent");

        let signal = emitter.claim_task("pkg.install", 90).unwrap();
        assert_eq!(signal.ttl_seconds, 180);
        assert_eq!(signal.signal_type, SignalType::Claiming);
    }

    #[test]
    fn report_danger_uses_max_strength_and_24h_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        let emitter = SignalEmitter::new(&board, "scout");

        let signal = emitter.report_danger("disk.wipe", "high", Some("accidental rm -rf")).unwrap();
        assert_eq!(signal.strength, 1.0);
        assert_eq!(signal.ttl_seconds, DANGER_TTL);
    }
}
