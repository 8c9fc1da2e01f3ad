//! Dispatcher — orchestrates the relay flow for each inbound event.
//!
//! New message: resolve routes → transform → send per destination → record
//! the successful copies. Edited message: look up the recorded copies →
//! re-transform → push updates. Failures are isolated at the smallest useful
//! scope: a destination that fails delivery never aborts its siblings, a
//! rule that fails never aborts other rules, and no event error is fatal.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{EditSyncCache, ForwardedCopy};
use crate::pipeline::ReplacementPipeline;
use crate::route::{self, RouteResolver};
use crate::rules::model::ForwardingRule;
use crate::rules::store::RuleStore;
use crate::transport::{InboundMessage, RelayEvent, Transport};

/// Orchestrates routing, transformation, delivery, and edit sync.
pub struct Dispatcher {
    resolver: RouteResolver,
    pipeline: ReplacementPipeline,
    cache: Arc<EditSyncCache>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        rules: Arc<RuleStore>,
        cache: Arc<EditSyncCache>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver: RouteResolver::new(rules.clone()),
            pipeline: ReplacementPipeline::new(rules),
            cache,
            transport,
        })
    }

    /// Consume the inbound event stream until the sender side closes.
    ///
    /// Each event is handled on its own task so one rule's pre-send delay or
    /// a slow network call never blocks the rest of the stream.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<RelayEvent>) {
        info!("Dispatcher started");
        while let Some(event) = events.recv().await {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                dispatcher.handle(event).await;
            });
        }
        info!("Dispatcher stopped (event stream closed)");
    }

    /// Handle a single event to completion.
    pub async fn handle(&self, event: RelayEvent) {
        match event {
            RelayEvent::New(message) => self.handle_new(message).await,
            RelayEvent::Edited(message) => self.handle_edit(message).await,
        }
    }

    // ── New messages ────────────────────────────────────────────────

    async fn handle_new(&self, message: InboundMessage) {
        let routes = self.resolver.resolve(message.origin_id).await;
        if routes.is_empty() {
            debug!(
                origin = message.origin_id,
                message_id = message.message_id,
                "No forwarding rule matches, skipping"
            );
            return;
        }

        // Replacement rules are global, so the transformed text is the same
        // for every rule — compute it once and share it.
        let transformed = self.pipeline.apply(&message.text).await;

        let tasks = routes
            .into_iter()
            .map(|rule| self.forward_with_rule(&message, rule, &transformed));
        join_all(tasks).await;
    }

    /// Apply one rule: wait out its delay, deliver to each destination in
    /// order, then record the copies that succeeded.
    async fn forward_with_rule(
        &self,
        message: &InboundMessage,
        rule: ForwardingRule,
        transformed: &str,
    ) {
        if !rule.delay.is_zero() {
            debug!(rule = %rule.label, delay_secs = rule.delay.as_secs(), "Delaying forward");
            tokio::time::sleep(rule.delay).await;
        }

        let text_changed = transformed != message.text;
        let mut copies = Vec::with_capacity(rule.destinations.len());

        for &dest in &rule.destinations {
            let dest = route::send_form(dest);

            let result = if message.has_media {
                if text_changed {
                    // Media with rewritten text: re-post with the new caption
                    // instead of forwarding verbatim.
                    self.transport
                        .copy(dest, message.origin_id, message.message_id, transformed)
                        .await
                } else {
                    self.transport
                        .forward(dest, message.origin_id, message.message_id)
                        .await
                }
            } else {
                let text = if transformed.is_empty() {
                    &message.text
                } else {
                    transformed
                };
                self.transport.send(dest, text).await
            };

            match result {
                Ok(copy_id) => {
                    info!(
                        rule = %rule.label,
                        origin = message.origin_id,
                        dest,
                        copy_id,
                        "Forwarded message"
                    );
                    copies.push(ForwardedCopy {
                        chat_id: dest,
                        message_id: copy_id,
                    });
                }
                Err(e) => {
                    warn!(
                        rule = %rule.label,
                        dest,
                        error = %e,
                        "Delivery failed, continuing with remaining destinations"
                    );
                }
            }
        }

        // Record after all attempts so the entry holds exactly the copies
        // that exist. An all-failed entry is still recorded: a later edit
        // becomes a cheap no-op lookup.
        self.cache
            .record(message.origin_id, message.message_id, &rule, copies)
            .await;
    }

    // ── Edited messages ─────────────────────────────────────────────

    async fn handle_edit(&self, message: InboundMessage) {
        let Some(entry) = self
            .cache
            .lookup(message.origin_id, message.message_id)
            .await
        else {
            debug!(
                origin = message.origin_id,
                message_id = message.message_id,
                "Edit for untracked or expired message, skipping"
            );
            return;
        };

        let transformed = self.pipeline.apply(&message.text).await;
        let text = if transformed.is_empty() {
            &message.text
        } else {
            &transformed
        };

        let mut updated = 0usize;
        for copy in &entry.copies {
            match self
                .transport
                .edit(copy.chat_id, copy.message_id, text)
                .await
            {
                Ok(()) => updated += 1,
                Err(e) => {
                    warn!(
                        dest = copy.chat_id,
                        copy_id = copy.message_id,
                        error = %e,
                        "Copy update failed, continuing with remaining copies"
                    );
                }
            }
        }

        info!(
            origin = message.origin_id,
            message_id = message.message_id,
            rule = %entry.rule_label,
            updated,
            total = entry.copies.len(),
            "Propagated edit to forwarded copies"
        );
    }
}
