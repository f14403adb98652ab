//! Per-agent JSON memory documents (§4.3).

pub mod document;
mod store;

pub use document::MemoryDocument;
pub use store::{key_looks_like_secret, AgentMemory, MemoryError, MemoryStats};
