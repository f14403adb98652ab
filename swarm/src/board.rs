//! The stigmergic signal board (§4.8): filesystem-backed emit/sense/
//! consensus/decay, grounded on `agents/core/swarm/swarm.py`'s
//! `SwarmCoordinator`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::signal::{Signal, SignalType};

const DECAY_RATE: f64 = 0.05;
const WEAK_THRESHOLD: f64 = 0.1;
const DECAY_INTERVAL_SECONDS: i64 = 300;
const DEFAULT_TTL_SECONDS: i64 = 3600;
const DEFAULT_SENSE_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The `(id -> {type, source_agent, target, created_at})` lookup table
/// persisted alongside the signal files for fast filtering without
/// loading every signal.
#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    signal_type: SignalType,
    source_agent: String,
    target: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Index {
    signals: HashMap<String, IndexEntry>,
    last_decay: DateTime<Utc>,
}

impl Index {
    fn empty(now: DateTime<Utc>) -> Self {
        Index {
            signals: HashMap::new(),
            last_decay: now,
        }
    }
}

/// Overall sentiment for a target, returned by [`SwarmCoordinator::consensus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Proceed,
    Avoid,
    Caution,
    Explore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub signals_count: usize,
    pub positive_score: f64,
    pub negative_score: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DecayCounts {
    pub decayed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStats {
    pub total_signals: usize,
    pub signals_by_type: HashMap<String, usize>,
    pub signals_by_agent: HashMap<String, usize>,
    pub average_strength: f64,
    pub last_decay: DateTime<Utc>,
}

/// Filesystem-backed stigmergic signal board shared by every agent.
///
/// Each signal is a JSON file named `<id>.json` under `signals/`; a sibling
/// `index.json` tracks enough metadata about each signal for `sense` to
/// filter without reading every file. Both are guarded by advisory file
/// locks (shared for reads, exclusive for writes), matching §5's "Swarm
/// index: exclusive lock on write, shared lock on read" policy. An
/// in-process mutex additionally serializes mutating operations so that
/// read-modify-write sequences (reinforcement, decay) are atomic across
/// threads within this process, the way `AgentMemory` layers a
/// `parking_lot::Mutex` on top of its own file lock.
pub struct SwarmCoordinator {
    signals_dir: PathBuf,
    index_path: PathBuf,
    guard: Mutex<()>,
}

impl SwarmCoordinator {
    pub fn open(swarm_dir: impl AsRef<Path>) -> Result<Self, SwarmError> {
        let swarm_dir = swarm_dir.as_ref();
        let signals_dir = swarm_dir.join("signals");
        fs::create_dir_all(&signals_dir)?;
        let index_path = swarm_dir.join("index.json");

        let coordinator = SwarmCoordinator {
            signals_dir,
            index_path,
            guard: Mutex::new(()),
        };
        if !coordinator.index_path.exists() {
            coordinator.write_index(&Index::empty(Utc::now()))?;
        }
        Ok(coordinator)
    }

    fn signal_path(&self, id: &str) -> PathBuf {
        self.signals_dir.join(format!("{id}.json"))
    }

    fn read_index(&self) -> Result<Index, SwarmError> {
        let file = File::open(&self.index_path)?;
        file.lock_shared()?;
        let result = (|| -> Result<Index, SwarmError> {
            let raw = fs::read_to_string(&self.index_path)?;
            Ok(serde_json::from_str(&raw)?)
        })();
        let _ = file.unlock();
        result.or_else(|_| Ok(Index::empty(Utc::now())))
    }

    fn write_index(&self, index: &Index) -> Result<(), SwarmError> {
        let file = File::create(&self.index_path)?;
        file.lock_exclusive()?;
        let result = serde_json::to_writer_pretty(&file, index).map_err(SwarmError::from);
        let _ = file.unlock();
        result
    }

    fn load_signal(&self, id: &str) -> Option<Signal> {
        let raw = fs::read_to_string(self.signal_path(id)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn save_signal(&self, signal: &Signal) -> Result<(), SwarmError> {
        let serialized = serde_json::to_vec_pretty(signal)?;
        fs::write(self.signal_path(&signal.id), serialized)?;
        Ok(())
    }

    fn delete_signal(&self, id: &str) {
        let _ = fs::remove_file(self.signal_path(id));
    }

    /// Emit a signal, or reinforce an existing one with the same
    /// `(type, source_agent, target)` triple instead of creating a
    /// duplicate.
    pub fn emit(
        &self,
        signal_type: SignalType,
        source_agent: &str,
        target: &str,
        data: Value,
        strength: f64,
        ttl_seconds: i64,
    ) -> Result<Signal, SwarmError> {
        let _held = self.guard.lock();
        let mut index = self.read_index()?;
        let now = Utc::now();

        let existing_id = index.signals.iter().find_map(|(id, entry)| {
            (entry.signal_type == signal_type && entry.source_agent == source_agent && entry.target == target)
                .then(|| id.clone())
        });

        if let Some(id) = existing_id {
            if let Some(mut signal) = self.load_signal(&id) {
                signal.reinforce(now);
                signal.merge_data(&data);
                self.save_signal(&signal)?;
                return Ok(signal);
            }
        }

        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let signal = Signal::new(id.clone(), signal_type, source_agent.to_string(), target.to_string(), strength, data, ttl_seconds, now);
        self.save_signal(&signal)?;

        index.signals.insert(
            id,
            IndexEntry {
                signal_type,
                source_agent: source_agent.to_string(),
                target: target.to_string(),
                created_at: now,
            },
        );
        self.write_index(&index)?;
        Ok(signal)
    }

    pub fn emit_default(&self, signal_type: SignalType, source_agent: &str, target: &str, data: Value) -> Result<Signal, SwarmError> {
        self.emit(signal_type, source_agent, target, data, 1.0, DEFAULT_TTL_SECONDS)
    }

    /// Sense signals matching the given filters, strongest first.
    pub fn sense(&self, signal_types: Option<&[SignalType]>, target: Option<&str>, min_strength: f64, limit: usize) -> Result<Vec<Signal>, SwarmError> {
        self.maybe_decay()?;

        let index = self.read_index()?;
        let now = Utc::now();
        let mut signals: Vec<Signal> = index
            .signals
            .keys()
            .filter_map(|id| self.load_signal(id))
            .filter(|signal| !signal.is_expired(now) && signal.strength >= min_strength)
            .filter(|signal| signal_types.map(|types| types.contains(&signal.signal_type)).unwrap_or(true))
            .filter(|signal| target.map(|t| signal.target == t).unwrap_or(true))
            .collect();

        signals.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal));
        let limit = if limit == 0 { DEFAULT_SENSE_LIMIT } else { limit };
        signals.truncate(limit);
        Ok(signals)
    }

    fn sense_for_target(&self, target: &str) -> Result<Vec<Signal>, SwarmError> {
        self.sense(None, Some(target), 0.0, usize::MAX)
    }

    /// Swarm consensus about a target: net positive/negative strength
    /// determines sentiment and recommendation, matching the source's
    /// `get_consensus` thresholds (`net > 0.5` proceed, `net < -0.5`
    /// avoid, otherwise caution; no signals at all is "unknown"/"explore").
    pub fn consensus(&self, target: &str) -> Result<Consensus, SwarmError> {
        let signals = self.sense_for_target(target)?;

        if signals.is_empty() {
            return Ok(Consensus {
                sentiment: Sentiment::Unknown,
                confidence: 0.0,
                recommendation: Recommendation::Explore,
                signals_count: 0,
                positive_score: 0.0,
                negative_score: 0.0,
            });
        }

        let mut positive_score = 0.0;
        let mut negative_score = 0.0;
        for signal in &signals {
            if signal.signal_type.is_positive() {
                positive_score += signal.strength;
            } else if signal.signal_type.is_negative() {
                negative_score += signal.strength;
            }
        }

        let net = positive_score - negative_score;
        let confidence = (signals.len() as f64 / 10.0).min(1.0);
        let (sentiment, recommendation) = if net > 0.5 {
            (Sentiment::Positive, Recommendation::Proceed)
        } else if net < -0.5 {
            (Sentiment::Negative, Recommendation::Avoid)
        } else {
            (Sentiment::Neutral, Recommendation::Caution)
        };

        Ok(Consensus {
            sentiment,
            confidence,
            recommendation,
            signals_count: signals.len(),
            positive_score,
            negative_score,
        })
    }

    /// Decay every signal; delete anything expired or weak. Returns how
    /// many signals were decayed vs. removed.
    pub fn decay_all(&self) -> Result<DecayCounts, SwarmError> {
        let _held = self.guard.lock();
        let mut index = self.read_index()?;
        let now = Utc::now();
        let mut counts = DecayCounts::default();

        let ids: Vec<String> = index.signals.keys().cloned().collect();
        for id in ids {
            match self.load_signal(&id) {
                None => {
                    index.signals.remove(&id);
                    counts.removed += 1;
                }
                Some(mut signal) => {
                    if signal.is_expired(now) || signal.is_weak(WEAK_THRESHOLD) {
                        self.delete_signal(&id);
                        index.signals.remove(&id);
                        counts.removed += 1;
                    } else {
                        signal.decay(DECAY_RATE, now);
                        self.save_signal(&signal)?;
                        counts.decayed += 1;
                    }
                }
            }
        }

        index.last_decay = now;
        self.write_index(&index)?;
        Ok(counts)
    }

    /// Runs `decay_all` if the decay interval has elapsed since the last
    /// run, mirroring the source's lazy `maybe_decay` triggered from `sense`.
    fn maybe_decay(&self) -> Result<Option<DecayCounts>, SwarmError> {
        let index = self.read_index()?;
        if Utc::now() - index.last_decay > chrono::Duration::seconds(DECAY_INTERVAL_SECONDS) {
            Ok(Some(self.decay_all()?))
        } else {
            Ok(None)
        }
    }

    pub fn stats(&self) -> Result<SwarmStats, SwarmError> {
        let signals = self.sense(None, None, 0.0, usize::MAX)?;
        let index = self.read_index()?;

        let mut signals_by_type: HashMap<String, usize> = HashMap::new();
        let mut signals_by_agent: HashMap<String, usize> = HashMap::new();
        let mut total_strength = 0.0;
        for signal in &signals {
            let type_name = serde_json::to_value(signal.signal_type)?.as_str().unwrap_or_default().to_string();
            *signals_by_type.entry(type_name).or_insert(0) += 1;
            *signals_by_agent.entry(signal.source_agent.clone()).or_insert(0) += 1;
            total_strength += signal.strength;
        }

        Ok(SwarmStats {
            total_signals: signals.len(),
            signals_by_type,
            signals_by_agent,
            average_strength: if signals.is_empty() { 0.0 } else { total_strength / signals.len() as f64 },
            last_decay: index.last_decay,
        })
    }

    /// Deletes every signal and resets the index. Intended for tests/reset.
    pub fn clear(&self) -> Result<(), SwarmError> {
        let _held = self.guard.lock();
        for entry in fs::read_dir(&self.signals_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|ext| ext.to_str()) == Some("json") {
                let _ = fs::remove_file(entry.path());
            }
        }
        self.write_index(&Index::empty(Utc::now()))?;
        Ok(())
    }
}
