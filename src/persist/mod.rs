//! Rule persistence — snapshot load/save behind a backend-agnostic trait.
//!
//! The store's contract is deliberately opaque: a [`RuleSnapshot`] in, a
//! [`RuleSnapshot`] out. `RuleStore` saves a full snapshot after every
//! mutation and rolls the mutation back if the save fails.

pub mod json_file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::rules::model::{ForwardingRule, ReplacementSpec};

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Full persisted rule state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSnapshot {
    #[serde(default)]
    pub forwarding: Vec<ForwardingRule>,
    #[serde(default)]
    pub replacements: Vec<ReplacementSpec>,
}

/// Durable storage for rule definitions.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the persisted snapshot. A missing store yields the empty snapshot.
    async fn load(&self) -> Result<RuleSnapshot, PersistenceError>;

    /// Replace the persisted snapshot.
    async fn save(&self, snapshot: &RuleSnapshot) -> Result<(), PersistenceError>;
}
