//! Signal type vocabulary and the pheromone-like `Signal` record (§3, §4.8).
//!
//! Grounded on `agents/core/swarm/swarm.py`'s `SignalType` and `Signal`
//! dataclass; field names and decay/reinforce arithmetic are carried over
//! verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REINFORCE_AMOUNT: f64 = 0.3;
const REINFORCE_TTL_BONUS: i64 = 600;
const MAX_TTL: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Success,
    ResourceFound,
    PathClear,
    Failure,
    Blocked,
    Danger,
    Working,
    Claiming,
    Releasing,
    HelpNeeded,
    Learned,
    Optimized,
    Deprecated,
    Heartbeat,
    Startup,
    Shutdown,
}

impl SignalType {
    /// Attracts other agents toward the target (§4.8: "the first three").
    pub fn is_positive(self) -> bool {
        matches!(self, SignalType::Success | SignalType::ResourceFound | SignalType::PathClear)
    }

    /// Repels or cautions other agents away from the target.
    pub fn is_negative(self) -> bool {
        matches!(self, SignalType::Failure | SignalType::Blocked | SignalType::Danger)
    }
}

/// A pheromone-like record left in the shared swarm board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub signal_type: SignalType,
    pub source_agent: String,
    pub target: String,
    pub strength: f64,
    #[serde(default)]
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_seconds: i64,
    #[serde(default)]
    pub reinforcement_count: u64,
}

impl Signal {
    pub fn new(
        id: String,
        signal_type: SignalType,
        source_agent: String,
        target: String,
        strength: f64,
        data: Value,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Signal {
            id,
            signal_type,
            source_agent,
            target,
            strength: strength.clamp(0.0, 1.0),
            data,
            created_at: now,
            updated_at: now,
            ttl_seconds,
            reinforcement_count: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + chrono::Duration::seconds(self.ttl_seconds)
    }

    pub fn is_weak(&self, threshold: f64) -> bool {
        self.strength < threshold
    }

    /// Applies one decay cycle, floored at 0.0.
    pub fn decay(&mut self, rate: f64, now: DateTime<Utc>) -> f64 {
        self.strength = (self.strength - rate).max(0.0);
        self.updated_at = now;
        self.strength
    }

    /// Boosts strength, bumps the reinforcement counter, and extends the
    /// TTL by 600s (capped at 86,400s), matching the source's `reinforce`.
    pub fn reinforce(&mut self, now: DateTime<Utc>) -> f64 {
        self.strength = (self.strength + REINFORCE_AMOUNT).min(1.0);
        self.reinforcement_count += 1;
        self.updated_at = now;
        self.ttl_seconds = (self.ttl_seconds + REINFORCE_TTL_BONUS).min(MAX_TTL);
        self.strength
    }

    pub fn merge_data(&mut self, incoming: &Value) {
        if let (Value::Object(existing), Value::Object(extra)) = (&mut self.data, incoming) {
            for (key, value) in extra {
                existing.insert(key.clone(), value.clone());
            }
        } else if !incoming.is_null() {
            self.data = incoming.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn positive_and_negative_partition_matches_spec() {
        assert!(SignalType::Success.is_positive());
        assert!(SignalType::ResourceFound.is_positive());
        assert!(SignalType::PathClear.is_positive());
        assert!(SignalType::Failure.is_negative());
        assert!(SignalType::Blocked.is_negative());
        assert!(SignalType::Danger.is_negative());
        assert!(!SignalType::Working.is_positive());
        assert!(!SignalType::Working.is_negative());
    }

    #[test]
    fn reinforce_boosts_strength_extends_ttl_and_counts() {
        let t0 = now();
        let mut signal = Signal::new(
            "abc".into(),
            SignalType::Success,
            "scout".into(),
            "pkg.install".into(),
            0.5,
            json!({}),
            3600,
            t0,
        );
        let t1 = t0 + chrono::Duration::seconds(5);
        let strength = signal.reinforce(t1);
        assert!((strength - 0.8).abs() < 1e-9);
        assert_eq!(signal.reinforcement_count, 1);
        assert_eq!(signal.ttl_seconds, 4200);
        assert_eq!(signal.updated_at, t1);
    }

    #[test]
    fn reinforce_clamps_strength_and_ttl_at_maxima() {
        let t0 = now();
        let mut signal = Signal::new(
            "abc".into(),
            SignalType::Danger,
            "scout".into(),
            "fs.write".into(),
            0.95,
            json!({}),
            86_000,
            t0,
        );
        signal.reinforce(t0);
        assert_eq!(signal.strength, 1.0);
        assert_eq!(signal.ttl_seconds, 86_400);
    }

    #[test]
    fn decay_floors_at_zero() {
        let t0 = now();
        let mut signal = Signal::new(
            "abc".into(),
            SignalType::Working,
            "scout".into(),
            "pkg.install".into(),
            0.03,
            json!({}),
            3600,
            t0,
        );
        signal.decay(0.05, t0);
        assert_eq!(signal.strength, 0.0);
    }

    #[test]
    fn expiry_is_strictly_after_ttl_elapses() {
        let t0 = now();
        let signal = Signal::new(
            "abc".into(),
            SignalType::Working,
            "scout".into(),
            "pkg.install".into(),
            1.0,
            json!({}),
            60,
            t0,
        );
        assert!(!signal.is_expired(t0 + chrono::Duration::seconds(60)));
        assert!(signal.is_expired(t0 + chrono::Duration::seconds(61)));
    }
}
