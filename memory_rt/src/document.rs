//! The on-disk shape of an agent's memory document (§4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub history: Vec<Value>,
}

impl MemoryDocument {
    pub fn new(agent_name: &str) -> Self {
        let now = Utc::now();
        MemoryDocument {
            agent_name: agent_name.to_string(),
            created_at: now,
            updated_at: now,
            data: Map::new(),
            history: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
