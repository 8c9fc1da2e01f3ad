//! Edit-sync cache — links an original message to its forwarded copies so
//! later edits can be propagated.
//!
//! Entries reference their governing rule by label only; the rule may be
//! deleted or recreated independently. A dangling or recreated rule never
//! faults — the entry is simply treated as expired. Expiry is enforced
//! lazily on lookup and by a periodic sweep task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::rules::model::ForwardingRule;
use crate::rules::store::RuleStore;
use crate::transport::{ChatId, MessageId};

/// One delivered copy of an original message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedCopy {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Copies produced for one original message, under one rule.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Label of the governing rule (non-owning).
    pub rule_label: String,
    /// Creation stamp of the rule at record time. A recreated rule under
    /// the same label gets a new stamp, which invalidates old entries.
    pub rule_created_at: chrono::DateTime<chrono::Utc>,
    pub copies: Vec<ForwardedCopy>,
    /// Monotonic record time; expiry is measured against this.
    pub recorded_at: Instant,
}

/// Cache of forwarded-copy records keyed by (origin channel, origin message).
pub struct EditSyncCache {
    rules: Arc<RuleStore>,
    entries: RwLock<HashMap<(ChatId, MessageId), CacheEntry>>,
}

impl EditSyncCache {
    pub fn new(rules: Arc<RuleStore>) -> Arc<Self> {
        Arc::new(Self {
            rules,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Record the copies produced for an original message, overwriting any
    /// previous entry for the same key.
    pub async fn record(
        &self,
        origin: ChatId,
        message_id: MessageId,
        rule: &ForwardingRule,
        copies: Vec<ForwardedCopy>,
    ) {
        let entry = CacheEntry {
            rule_label: rule.label.clone(),
            rule_created_at: rule.created_at,
            copies,
            recorded_at: Instant::now(),
        };

        debug!(
            origin,
            message_id,
            rule = %rule.label,
            copies = entry.copies.len(),
            "Recorded edit-sync entry"
        );

        self.entries
            .write()
            .await
            .insert((origin, message_id), entry);
    }

    /// Fetch the live entry for an original message.
    ///
    /// Expired entries — past the rule's edit window, or whose rule was
    /// deleted or recreated — are evicted as a side effect and `None` is
    /// returned.
    pub async fn lookup(&self, origin: ChatId, message_id: MessageId) -> Option<CacheEntry> {
        let key = (origin, message_id);

        let label = {
            let entries = self.entries.read().await;
            entries.get(&key)?.rule_label.clone()
        };
        let rule = self.rules.forwarding_rule(&label).await;

        let mut entries = self.entries.write().await;
        let entry = entries.get(&key)?;

        if entry_is_live(entry, rule.as_ref()) {
            Some(entry.clone())
        } else {
            debug!(origin, message_id, rule = %label, "Evicting expired edit-sync entry");
            entries.remove(&key);
            None
        }
    }

    /// Evict every expired entry. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let rules: HashMap<String, ForwardingRule> = self
            .rules
            .forwarding_rules()
            .await
            .into_iter()
            .map(|r| (r.label.clone(), r))
            .collect();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry_is_live(entry, rules.get(&entry.rule_label)));
        let evicted = before - entries.len();

        if evicted > 0 {
            info!(evicted, remaining = entries.len(), "Swept edit-sync cache");
        }
        evicted
    }

    /// Number of entries currently held (live or not yet swept).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// An entry is live while its rule still exists with the same creation
/// stamp and the edit window has not elapsed.
fn entry_is_live(entry: &CacheEntry, rule: Option<&ForwardingRule>) -> bool {
    match rule {
        Some(rule) if rule.created_at == entry.rule_created_at => {
            entry.recorded_at.elapsed() <= rule.max_edit_time
        }
        _ => false,
    }
}

/// Spawn a background task that periodically sweeps expired entries.
pub fn spawn_sweep_task(cache: Arc<EditSyncCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            cache.sweep().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{MemoryStore, SnapshotStore};

    async fn setup(max_edit_secs: u64) -> (Arc<RuleStore>, Arc<EditSyncCache>, ForwardingRule) {
        let backend = Arc::new(MemoryStore::new());
        let store = RuleStore::new(backend as Arc<dyn SnapshotStore>);
        store
            .add_forwarding_rule("news", vec![100], vec![200])
            .await
            .unwrap();
        store
            .set_max_edit_time("news", Duration::from_secs(max_edit_secs))
            .await
            .unwrap();
        let rule = store.forwarding_rule("news").await.unwrap();
        let cache = EditSyncCache::new(store.clone());
        (store, cache, rule)
    }

    fn copies() -> Vec<ForwardedCopy> {
        vec![
            ForwardedCopy {
                chat_id: 200,
                message_id: 11,
            },
            ForwardedCopy {
                chat_id: 300,
                message_id: 12,
            },
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_within_window_returns_entry() {
        let (_, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        let entry = cache.lookup(100, 1).await.unwrap();
        assert_eq!(entry.copies.len(), 2);
        assert_eq!(entry.rule_label, "news");
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_past_window_evicts() {
        let (_, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(cache.lookup(100, 1).await.is_none());
        // Evicted as a side effect, not just hidden.
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_boundary_is_inclusive() {
        let (_, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(cache.lookup(100, 1).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_expired() {
        let (store, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        store
            .add_forwarding_rule("slow", vec![101], vec![201])
            .await
            .unwrap();
        store
            .set_max_edit_time("slow", Duration::from_secs(3600))
            .await
            .unwrap();
        let slow = store.forwarding_rule("slow").await.unwrap();
        cache.record(101, 2, &slow, copies()).await;

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.lookup(101, 2).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_rule_expires_entry_immediately() {
        let (store, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        store.remove_forwarding_rule("news").await.unwrap();
        assert!(cache.lookup(100, 1).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn recreated_rule_does_not_resurrect_entries() {
        let (store, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;

        store.remove_forwarding_rule("news").await.unwrap();
        store
            .add_forwarding_rule("news", vec![100], vec![200])
            .await
            .unwrap();

        // Same label, new rule — the old entry stays dead.
        assert!(cache.lookup(100, 1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn record_overwrites_existing_entry() {
        let (_, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;
        cache
            .record(
                100,
                1,
                &rule,
                vec![ForwardedCopy {
                    chat_id: 400,
                    message_id: 99,
                }],
            )
            .await;

        let entry = cache.lookup(100, 1).await.unwrap();
        assert_eq!(entry.copies.len(), 1);
        assert_eq!(entry.copies[0].chat_id, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_counts_dangling_entries() {
        let (store, cache, rule) = setup(300).await;
        cache.record(100, 1, &rule, copies()).await;
        store.remove_forwarding_rule("news").await.unwrap();

        assert_eq!(cache.sweep().await, 1);
        assert!(cache.is_empty().await);
    }
}
