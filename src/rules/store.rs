//! Rule registry — single source of truth for forwarding and replacement
//! rules.
//!
//! All mutation goes through this store: validate, apply in memory, persist
//! the full snapshot synchronously, and roll the memory change back if the
//! save fails. Readers get cloned, label-ordered snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::RuleError;
use crate::persist::{RuleSnapshot, SnapshotStore};
use crate::rules::model::{ForwardingRule, ReplacementRule};
use crate::transport::ChatId;

#[derive(Clone, Default)]
struct Inner {
    forwarding: BTreeMap<String, ForwardingRule>,
    replacements: BTreeMap<String, ReplacementRule>,
}

impl Inner {
    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            forwarding: self.forwarding.values().cloned().collect(),
            replacements: self.replacements.values().map(|r| r.to_spec()).collect(),
        }
    }
}

/// In-memory rule registry backed by a [`SnapshotStore`].
pub struct RuleStore {
    store: Arc<dyn SnapshotStore>,
    inner: RwLock<Inner>,
}

impl RuleStore {
    /// Create an empty store.
    pub fn new(store: Arc<dyn SnapshotStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: RwLock::new(Inner::default()),
        })
    }

    /// Create a store pre-populated from the persisted snapshot,
    /// recompiling replacement regexes.
    pub async fn load(store: Arc<dyn SnapshotStore>) -> Result<Arc<Self>, RuleError> {
        let snapshot = store.load().await?;

        let mut inner = Inner::default();
        for rule in snapshot.forwarding {
            inner.forwarding.insert(rule.label.clone(), rule);
        }
        for spec in &snapshot.replacements {
            let rule = ReplacementRule::from_spec(spec)?;
            inner.replacements.insert(rule.label.clone(), rule);
        }

        info!(
            forwarding = inner.forwarding.len(),
            replacements = inner.replacements.len(),
            "Rule store loaded"
        );

        Ok(Arc::new(Self {
            store,
            inner: RwLock::new(inner),
        }))
    }

    /// Apply a mutation, persist, and roll back on save failure.
    ///
    /// Validation errors from the closure leave state untouched; a failed
    /// save restores the pre-mutation state before surfacing the error.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, RuleError>,
    ) -> Result<T, RuleError> {
        let mut inner = self.inner.write().await;
        let backup = inner.clone();

        let out = f(&mut inner)?;

        if let Err(e) = self.store.save(&inner.snapshot()).await {
            *inner = backup;
            return Err(e.into());
        }
        Ok(out)
    }

    // ── Forwarding rules ────────────────────────────────────────────

    /// Add a forwarding rule. Fails on a duplicate label or an empty
    /// source/destination set.
    pub async fn add_forwarding_rule(
        &self,
        label: &str,
        sources: Vec<ChatId>,
        destinations: Vec<ChatId>,
    ) -> Result<ForwardingRule, RuleError> {
        let rule = self
            .mutate(|inner| {
                if inner.forwarding.contains_key(label) {
                    return Err(RuleError::DuplicateLabel {
                        label: label.to_string(),
                    });
                }
                if sources.is_empty() || destinations.is_empty() {
                    return Err(RuleError::EmptySourceOrDestination {
                        label: label.to_string(),
                    });
                }
                let rule = ForwardingRule::new(label, sources, destinations);
                inner.forwarding.insert(label.to_string(), rule.clone());
                Ok(rule)
            })
            .await?;

        info!(label, "Added forwarding rule");
        Ok(rule)
    }

    /// Remove a forwarding rule.
    pub async fn remove_forwarding_rule(&self, label: &str) -> Result<(), RuleError> {
        self.mutate(|inner| {
            inner
                .forwarding
                .remove(label)
                .map(|_| ())
                .ok_or_else(|| RuleError::NotFound {
                    label: label.to_string(),
                })
        })
        .await?;

        info!(label, "Removed forwarding rule");
        Ok(())
    }

    /// Activate or deactivate a forwarding rule.
    pub async fn set_active(&self, label: &str, active: bool) -> Result<(), RuleError> {
        self.with_forwarding_rule(label, |rule| rule.active = active)
            .await?;
        info!(label, active, "Updated forwarding rule activity");
        Ok(())
    }

    /// Set the pre-send delay of a forwarding rule.
    pub async fn set_delay(&self, label: &str, delay: Duration) -> Result<(), RuleError> {
        self.with_forwarding_rule(label, |rule| rule.delay = delay)
            .await?;
        info!(label, delay_secs = delay.as_secs(), "Updated forwarding delay");
        Ok(())
    }

    /// Set the edit-propagation window of a forwarding rule.
    pub async fn set_max_edit_time(&self, label: &str, window: Duration) -> Result<(), RuleError> {
        self.with_forwarding_rule(label, |rule| rule.max_edit_time = window)
            .await?;
        info!(
            label,
            max_edit_secs = window.as_secs(),
            "Updated forwarding edit window"
        );
        Ok(())
    }

    async fn with_forwarding_rule(
        &self,
        label: &str,
        f: impl FnOnce(&mut ForwardingRule),
    ) -> Result<(), RuleError> {
        self.mutate(|inner| {
            let rule = inner
                .forwarding
                .get_mut(label)
                .ok_or_else(|| RuleError::NotFound {
                    label: label.to_string(),
                })?;
            f(rule);
            Ok(())
        })
        .await
    }

    /// Look up a single forwarding rule.
    pub async fn forwarding_rule(&self, label: &str) -> Option<ForwardingRule> {
        self.inner.read().await.forwarding.get(label).cloned()
    }

    /// Label-ordered snapshot of all forwarding rules.
    pub async fn forwarding_rules(&self) -> Vec<ForwardingRule> {
        self.inner.read().await.forwarding.values().cloned().collect()
    }

    // ── Replacement rules ───────────────────────────────────────────

    /// Parse and add a replacement rule. The variant is detected from the
    /// raw pair (see [`ReplacementRule::parse`]); a regex that fails to
    /// compile rejects the rule.
    pub async fn add_replacement_rule(
        &self,
        label: &str,
        original: &str,
        replacement: &str,
    ) -> Result<ReplacementRule, RuleError> {
        let rule = self
            .mutate(|inner| {
                if inner.replacements.contains_key(label) {
                    return Err(RuleError::DuplicateLabel {
                        label: label.to_string(),
                    });
                }
                let rule = ReplacementRule::parse(label, original, replacement)?;
                inner.replacements.insert(label.to_string(), rule.clone());
                Ok(rule)
            })
            .await?;

        info!(label, kind = rule.kind_label(), "Added replacement rule");
        Ok(rule)
    }

    /// Remove a replacement rule.
    pub async fn remove_replacement_rule(&self, label: &str) -> Result<(), RuleError> {
        self.mutate(|inner| {
            inner
                .replacements
                .remove(label)
                .map(|_| ())
                .ok_or_else(|| RuleError::NotFound {
                    label: label.to_string(),
                })
        })
        .await?;

        info!(label, "Removed replacement rule");
        Ok(())
    }

    /// Activate or deactivate a replacement rule.
    pub async fn set_replacement_active(&self, label: &str, active: bool) -> Result<(), RuleError> {
        self.mutate(|inner| {
            let rule = inner
                .replacements
                .get_mut(label)
                .ok_or_else(|| RuleError::NotFound {
                    label: label.to_string(),
                })?;
            rule.active = active;
            Ok(())
        })
        .await?;

        info!(label, active, "Updated replacement rule activity");
        Ok(())
    }

    /// Remove all replacement rules.
    pub async fn clear_replacement_rules(&self) -> Result<(), RuleError> {
        self.mutate(|inner| {
            inner.replacements.clear();
            Ok(())
        })
        .await?;

        info!("Cleared replacement rules");
        Ok(())
    }

    /// Label-ordered snapshot of all replacement rules.
    pub async fn replacement_rules(&self) -> Vec<ReplacementRule> {
        self.inner
            .read()
            .await
            .replacements
            .values()
            .cloned()
            .collect()
    }

    /// Label-ordered snapshot of the active replacement rules — the chain
    /// the pipeline applies.
    pub async fn active_replacements(&self) -> Vec<ReplacementRule> {
        self.inner
            .read()
            .await
            .replacements
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }
}
