//! Semantic sense helpers (§4.8 supplement), grounded on
//! `agents/core/swarm/signals.py`'s `SignalSensor`.

use std::collections::HashMap;

use serde_json::Value;

use crate::board::{Recommendation, Sentiment, SwarmCoordinator, SwarmError};
use crate::signal::{Signal, SignalType};

const CLAIM_MIN_STRENGTH: f64 = 0.3;
const HELP_MIN_STRENGTH: f64 = 0.2;
const APPROACH_MIN_STRENGTH: f64 = 0.2;
const FAILURE_MIN_STRENGTH: f64 = 0.1;
const DANGER_MIN_STRENGTH: f64 = 0.3;
const DISCOVERY_MIN_STRENGTH: f64 = 0.3;
const DEPRECATION_MIN_STRENGTH: f64 = 0.2;
const DISCOVERY_LIMIT: usize = 20;

/// Recommendation on whether to proceed with a task, combining a claim
/// check with [`SwarmCoordinator::consensus`].
#[derive(Debug, Clone)]
pub struct ProceedDecision {
    pub proceed: bool,
    pub reason: String,
    pub action: String,
    pub sentiment: Option<Sentiment>,
}

/// Overview of what other agents are currently doing.
#[derive(Debug, Clone, Default)]
pub struct SwarmActivity {
    pub agents: HashMap<String, Vec<String>>,
    pub targets: HashMap<String, Vec<String>>,
}

impl SwarmActivity {
    pub fn active_agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn active_target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Senses and interprets swarm signals on behalf of one agent.
pub struct SignalSensor<'a> {
    coordinator: &'a SwarmCoordinator,
    agent_name: String,
}

impl<'a> SignalSensor<'a> {
    pub fn new(coordinator: &'a SwarmCoordinator, agent_name: impl Into<String>) -> Self {
        SignalSensor {
            coordinator,
            agent_name: agent_name.into(),
        }
    }

    /// `(is_claimed, claiming_agent)`, ignoring this sensor's own agent's claims.
    pub fn is_task_claimed(&self, target: &str) -> Result<(bool, Option<String>), SwarmError> {
        let claims = self.coordinator.sense(Some(&[SignalType::Claiming, SignalType::Working]), Some(target), CLAIM_MIN_STRENGTH, 0)?;
        for claim in claims {
            if claim.source_agent != self.agent_name {
                return Ok((true, Some(claim.source_agent)));
            }
        }
        Ok((false, None))
    }

    /// Combines claim-checking with consensus to recommend whether to
    /// proceed, matching the source's `should_proceed`.
    pub fn should_proceed(&self, target: &str) -> Result<ProceedDecision, SwarmError> {
        let (claimed, claimer) = self.is_task_claimed(target)?;
        if claimed {
            return Ok(ProceedDecision {
                proceed: false,
                reason: format!("claimed by {}", claimer.unwrap_or_default()),
                action: "wait_or_help".to_string(),
                sentiment: None,
            });
        }

        let consensus = self.coordinator.consensus(target)?;
        if consensus.sentiment == Sentiment::Negative && consensus.confidence > 0.5 {
            return Ok(ProceedDecision {
                proceed: false,
                reason: "swarm reports failures".to_string(),
                action: "investigate".to_string(),
                sentiment: Some(consensus.sentiment),
            });
        }
        if consensus.sentiment == Sentiment::Unknown {
            return Ok(ProceedDecision {
                proceed: true,
                reason: "unexplored territory".to_string(),
                action: "explore_cautiously".to_string(),
                sentiment: Some(consensus.sentiment),
            });
        }

        let action = match consensus.recommendation {
            Recommendation::Proceed => "proceed",
            Recommendation::Avoid => "avoid",
            Recommendation::Caution => "caution",
            Recommendation::Explore => "explore",
        };
        Ok(ProceedDecision {
            proceed: true,
            reason: action.to_string(),
            action: action.to_string(),
            sentiment: Some(consensus.sentiment),
        })
    }

    /// Help requests, optionally filtered to ones this agent's
    /// capabilities can address.
    pub fn find_help_requests(&self, capabilities: Option<&[String]>) -> Result<Vec<Signal>, SwarmError> {
        let help_signals = self.coordinator.sense(Some(&[SignalType::HelpNeeded]), None, HELP_MIN_STRENGTH, 0)?;
        let Some(capabilities) = capabilities else {
            return Ok(help_signals);
        };

        Ok(help_signals
            .into_iter()
            .filter(|signal| {
                let needed = signal.data.get("needed_capabilities").and_then(Value::as_array);
                match needed {
                    None => true,
                    Some(needed) if needed.is_empty() => true,
                    Some(needed) => needed.iter().filter_map(Value::as_str).any(|c| capabilities.iter().any(|cap| cap == c)),
                }
            })
            .collect())
    }

    pub fn get_successful_approaches(&self, target: &str) -> Result<Vec<Signal>, SwarmError> {
        self.coordinator
            .sense(Some(&[SignalType::Success, SignalType::PathClear, SignalType::Optimized]), Some(target), APPROACH_MIN_STRENGTH, 0)
    }

    pub fn get_failures(&self, target: &str) -> Result<Vec<Signal>, SwarmError> {
        self.coordinator.sense(Some(&[SignalType::Failure, SignalType::Blocked]), Some(target), FAILURE_MIN_STRENGTH, 0)
    }

    pub fn get_dangers(&self, target: Option<&str>) -> Result<Vec<Signal>, SwarmError> {
        self.coordinator.sense(Some(&[SignalType::Danger]), target, DANGER_MIN_STRENGTH, 0)
    }

    pub fn get_discoveries(&self, limit: usize) -> Result<Vec<Signal>, SwarmError> {
        let limit = if limit == 0 { DISCOVERY_LIMIT } else { limit };
        self.coordinator
            .sense(Some(&[SignalType::Learned, SignalType::Optimized, SignalType::ResourceFound]), None, DISCOVERY_MIN_STRENGTH, limit)
    }

    pub fn get_deprecations(&self) -> Result<Vec<Signal>, SwarmError> {
        self.coordinator.sense(Some(&[SignalType::Deprecated]), None, DEPRECATION_MIN_STRENGTH, 0)
    }

    pub fn get_swarm_activity(&self) -> Result<SwarmActivity, SwarmError> {
        let working = self.coordinator.sense(Some(&[SignalType::Working, SignalType::Claiming]), None, 0.0, 0)?;

        let mut activity = SwarmActivity::default();
        for signal in working {
            activity.agents.entry(signal.source_agent.clone()).or_default().push(signal.target.clone());
            activity.targets.entry(signal.target.clone()).or_default().push(signal.source_agent.clone());
        }
        Ok(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_task_claimed_ignores_the_sensing_agent_itself() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        board.emit_default(SignalType::Claiming, "build_agent", "pkg.install", json!({})).unwrap();

        let own_sensor = SignalSensor::new(&board, "build_agent");
        let (claimed, _) = own_sensor.is_task_claimed("pkg.install").unwrap();
        assert!(!claimed);

        let other_sensor = SignalSensor::new(&board, "scout");
        let (claimed, by) = other_sensor.is_task_claimed("pkg.install").unwrap();
        assert!(claimed);
        assert_eq!(by.as_deref(), Some("build_agent"));
    }

    #[test]
    fn should_proceed_refuses_when_claimed_by_another_agent() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        board.emit_default(SignalType::Claiming, "build_agent", "pkg.install", json!({})).unwrap();

        let sensor = SignalSensor::new(&board, "scout");
        let decision = sensor.should_proceed("pkg.install").unwrap();
        assert!(!decision.proceed);
        assert_eq!(decision.action, "wait_or_help");
    }

    #[test]
    fn should_proceed_on_unexplored_target_explores_cautiously() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        let sensor = SignalSensor::new(&board, "scout");

        let decision = sensor.should_proceed("never.seen").unwrap();
        assert!(decision.proceed);
        assert_eq!(decision.action, "explore_cautiously");
    }

    #[test]
    fn find_help_requests_filters_by_capability() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        board
            .emit_default(SignalType::HelpNeeded, "a", "t1", json!({"needed_capabilities": ["exec.pkg"]}))
            .unwrap();
        board
            .emit_default(SignalType::HelpNeeded, "b", "t2", json!({"needed_capabilities": ["network.external"]}))
            .unwrap();

        let sensor = SignalSensor::new(&board, "scout");
        let matches = sensor.find_help_requests(Some(&["exec.pkg".to_string()])).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_agent, "a");
    }

    #[test]
    fn get_swarm_activity_groups_by_agent_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let board = SwarmCoordinator::open(dir.path()).unwrap();
        board.emit_default(SignalType::Working, "a", "t1", json!({})).unwrap();
        board.emit_default(SignalType::Claiming, "b", "t1", json!({})).unwrap();

        let sensor = SignalSensor::new(&board, "scout");
        let activity = sensor.get_swarm_activity().unwrap();
        assert_eq!(activity.active_agent_count(), 2);
        assert_eq!(activity.active_target_count(), 1);
    }
}
