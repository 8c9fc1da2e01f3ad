//! In-memory snapshot store — ephemeral runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PersistenceError;
use crate::persist::{RuleSnapshot, SnapshotStore};

/// Snapshot store that keeps the document in memory.
///
/// `fail_next_save` lets tests exercise the rollback path of `RuleStore`
/// without a filesystem.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<RuleSnapshot>,
    fail_next_save: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` call fail with a store error.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Current persisted state (test inspection).
    pub async fn snapshot(&self) -> RuleSnapshot {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<RuleSnapshot, PersistenceError> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &RuleSnapshot) -> Result<(), PersistenceError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Store("injected save failure".into()));
        }
        *self.snapshot.lock().await = snapshot.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_load() {
        let store = MemoryStore::new();
        let snapshot = RuleSnapshot {
            forwarding: vec![crate::rules::model::ForwardingRule::new(
                "a",
                vec![1],
                vec![2],
            )],
            replacements: vec![],
        };
        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap().forwarding.len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next_save();
        assert!(store.save(&RuleSnapshot::default()).await.is_err());
        assert!(store.save(&RuleSnapshot::default()).await.is_ok());
    }
}
