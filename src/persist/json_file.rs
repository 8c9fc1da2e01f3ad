//! JSON file snapshot store.
//!
//! Rules are one small document, so the whole snapshot is rewritten on every
//! save: serialized to a sibling temp file, then renamed over the target so a
//! crash mid-write never leaves a torn document behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::persist::{RuleSnapshot, SnapshotStore};

/// Snapshot store backed by a single JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        tmp.set_extension("json.tmp");
        tmp
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<RuleSnapshot, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot: RuleSnapshot = serde_json::from_slice(&bytes)?;
                info!(
                    path = %self.path.display(),
                    forwarding = snapshot.forwarding.len(),
                    replacements = snapshot.replacements.len(),
                    "Loaded rule snapshot"
                );
                Ok(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No rule snapshot found, starting empty");
                Ok(RuleSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &RuleSnapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            forwarding = snapshot.forwarding.len(),
            replacements = snapshot.replacements.len(),
            "Saved rule snapshot"
        );
        Ok(())
    }
}
