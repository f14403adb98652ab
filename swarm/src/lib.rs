//! The stigmergic swarm signal board (§4.8): a filesystem-backed pheromone
//! store with decay and consensus queries, plus the `SignalEmitter`/
//! `SignalSensor` convenience facade over it.
//!
//! Grounded on `agents/core/swarm/swarm.py` and `agents/core/swarm/signals.py`.

pub mod board;
pub mod emitter;
pub mod sensor;
pub mod signal;

pub use board::{Consensus, DecayCounts, Recommendation, Sentiment, SwarmCoordinator, SwarmError, SwarmStats};
pub use emitter::SignalEmitter;
pub use sensor::{ProceedDecision, SignalSensor, SwarmActivity};
pub use signal::{Signal, SignalType};

/// Convenience constructor mirroring the source's `create_swarm_interface`.
pub fn create_swarm_interface<'a>(coordinator: &'a SwarmCoordinator, agent_name: impl Into<String> + Clone) -> (SignalEmitter<'a>, SignalSensor<'a>) {
    (SignalEmitter::new(coordinator, agent_name.clone()), SignalSensor::new(coordinator, agent_name))
}
