//! Integration tests for the relay flow.
//!
//! Each test wires a real `RuleStore` + `EditSyncCache` + `Dispatcher`
//! against a recording fake transport and an in-memory snapshot store, then
//! drives inbound events through the public event path.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

use chanrelay::cache::EditSyncCache;
use chanrelay::commands::CommandHandler;
use chanrelay::dispatch::Dispatcher;
use chanrelay::error::DeliveryError;
use chanrelay::persist::{MemoryStore, SnapshotStore};
use chanrelay::rules::RuleStore;
use chanrelay::transport::{ChatId, InboundMessage, MessageId, RelayEvent, Transport};

/// Maximum time any non-paused test is allowed to run before we consider it
/// hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One delivery observed by the fake transport.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delivered {
    Text {
        dest: ChatId,
        id: MessageId,
        text: String,
    },
    Edited {
        dest: ChatId,
        id: MessageId,
        text: String,
    },
}

/// Recording transport; destinations listed in `failing` reject every call.
struct StubTransport {
    deliveries: Mutex<Vec<Delivered>>,
    failing: Vec<ChatId>,
    next_id: AtomicI64,
}

impl StubTransport {
    fn new(failing: Vec<ChatId>) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            failing,
            next_id: AtomicI64::new(5000),
        })
    }

    async fn deliveries(&self) -> Vec<Delivered> {
        self.deliveries.lock().await.clone()
    }

    fn gate(&self, dest: ChatId) -> Result<MessageId, DeliveryError> {
        if self.failing.contains(&dest) {
            return Err(DeliveryError::SendFailed {
                chat_id: dest,
                reason: "stub failure".into(),
            });
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, dest: ChatId, text: &str) -> Result<MessageId, DeliveryError> {
        let id = self.gate(dest)?;
        self.deliveries.lock().await.push(Delivered::Text {
            dest,
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn forward(
        &self,
        dest: ChatId,
        _origin: ChatId,
        _message_id: MessageId,
    ) -> Result<MessageId, DeliveryError> {
        let id = self.gate(dest)?;
        self.deliveries.lock().await.push(Delivered::Text {
            dest,
            id,
            text: "<forwarded>".into(),
        });
        Ok(id)
    }

    async fn copy(
        &self,
        dest: ChatId,
        _origin: ChatId,
        _message_id: MessageId,
        caption: &str,
    ) -> Result<MessageId, DeliveryError> {
        let id = self.gate(dest)?;
        self.deliveries.lock().await.push(Delivered::Text {
            dest,
            id,
            text: caption.to_string(),
        });
        Ok(id)
    }

    async fn edit(
        &self,
        dest: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.gate(dest)?;
        self.deliveries.lock().await.push(Delivered::Edited {
            dest,
            id: message_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

struct Relay {
    rules: Arc<RuleStore>,
    cache: Arc<EditSyncCache>,
    transport: Arc<StubTransport>,
    dispatcher: Arc<Dispatcher>,
}

fn relay_with(failing: Vec<ChatId>) -> Relay {
    let backend = Arc::new(MemoryStore::new());
    let rules = RuleStore::new(backend as Arc<dyn SnapshotStore>);
    let cache = EditSyncCache::new(rules.clone());
    let transport = StubTransport::new(failing);
    let dispatcher = Dispatcher::new(rules.clone(), cache.clone(), transport.clone());
    Relay {
        rules,
        cache,
        transport,
        dispatcher,
    }
}

fn new_event(origin: ChatId, message_id: MessageId, text: &str) -> RelayEvent {
    RelayEvent::New(InboundMessage {
        origin_id: origin,
        message_id,
        text: text.to_string(),
        has_media: false,
    })
}

fn edit_event(origin: ChatId, message_id: MessageId, text: &str) -> RelayEvent {
    RelayEvent::Edited(InboundMessage {
        origin_id: origin,
        message_id,
        text: text.to_string(),
        has_media: false,
    })
}

#[tokio::test]
async fn news_rule_forwards_to_both_destinations() {
    let relay = relay_with(vec![]);
    relay
        .rules
        .add_forwarding_rule("news", vec![100], vec![200, 300])
        .await
        .unwrap();

    let (tx, rx) = mpsc::channel(16);
    let run = tokio::spawn(relay.dispatcher.clone().run(rx));

    tx.send(new_event(100, 1, "hello")).await.unwrap();
    drop(tx);
    timeout(TEST_TIMEOUT, run).await.unwrap().unwrap();
    // Let the per-event task finish its deliveries.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let deliveries = relay.transport.deliveries().await;
    let dests: Vec<ChatId> = deliveries
        .iter()
        .map(|d| match d {
            Delivered::Text { dest, .. } | Delivered::Edited { dest, .. } => *dest,
        })
        .collect();
    assert_eq!(dests, vec![200, 300]);
    for d in &deliveries {
        assert!(matches!(d, Delivered::Text { text, .. } if text == "hello"));
    }

    let entry = relay.cache.lookup(100, 1).await.unwrap();
    assert_eq!(entry.copies.len(), 2);
}

#[tokio::test]
async fn partial_failure_keeps_two_of_three_copies() {
    let relay = relay_with(vec![300]);
    relay
        .rules
        .add_forwarding_rule("fanout", vec![100], vec![200, 300, 400])
        .await
        .unwrap();

    relay.dispatcher.handle(new_event(100, 7, "payload")).await;

    let entry = relay.cache.lookup(100, 7).await.unwrap();
    let recorded: Vec<ChatId> = entry.copies.iter().map(|c| c.chat_id).collect();
    assert_eq!(recorded, vec![200, 400]);

    // A later edit only touches the copies that exist.
    relay.dispatcher.handle(edit_event(100, 7, "fixed")).await;
    let edits: Vec<ChatId> = relay
        .transport
        .deliveries()
        .await
        .into_iter()
        .filter_map(|d| match d {
            Delivered::Edited { dest, .. } => Some(dest),
            _ => None,
        })
        .collect();
    assert_eq!(edits, vec![200, 400]);
}

#[tokio::test(start_paused = true)]
async fn edit_window_boundary() {
    let relay = relay_with(vec![]);
    relay
        .rules
        .add_forwarding_rule("news", vec![100], vec![200])
        .await
        .unwrap();
    relay
        .rules
        .set_max_edit_time("news", Duration::from_secs(120))
        .await
        .unwrap();

    // Inside the window: the copy is updated.
    relay.dispatcher.handle(new_event(100, 1, "v1")).await;
    tokio::time::advance(Duration::from_secs(119)).await;
    relay.dispatcher.handle(edit_event(100, 1, "v2")).await;

    let edits = relay
        .transport
        .deliveries()
        .await
        .into_iter()
        .filter(|d| matches!(d, Delivered::Edited { .. }))
        .count();
    assert_eq!(edits, 1);

    // Outside the window: no update, entry evicted.
    relay.dispatcher.handle(new_event(100, 2, "v1")).await;
    tokio::time::advance(Duration::from_secs(121)).await;
    relay.dispatcher.handle(edit_event(100, 2, "v2")).await;

    let edits = relay
        .transport
        .deliveries()
        .await
        .into_iter()
        .filter(|d| matches!(d, Delivered::Edited { .. }))
        .count();
    assert_eq!(edits, 1, "second edit arrived too late");
    assert!(relay.cache.lookup(100, 2).await.is_none());
}

#[tokio::test]
async fn replacement_chain_applies_in_order_on_forward_and_edit() {
    let relay = relay_with(vec![]);
    relay
        .rules
        .add_forwarding_rule("news", vec![100], vec![200])
        .await
        .unwrap();
    relay
        .rules
        .add_replacement_rule("a_first", "crypto", "stock")
        .await
        .unwrap();
    relay
        .rules
        .add_replacement_rule("b_second", "stock tips", "advice")
        .await
        .unwrap();

    relay
        .dispatcher
        .handle(new_event(100, 1, "crypto tips inside"))
        .await;

    let deliveries = relay.transport.deliveries().await;
    assert!(matches!(
        &deliveries[0],
        Delivered::Text { text, .. } if text == "advice inside"
    ));

    relay
        .dispatcher
        .handle(edit_event(100, 1, "more crypto tips"))
        .await;
    let deliveries = relay.transport.deliveries().await;
    assert!(matches!(
        deliveries.last().unwrap(),
        Delivered::Edited { text, .. } if text == "more advice"
    ));
}

#[tokio::test]
async fn recreated_rule_does_not_adopt_old_copies() {
    let relay = relay_with(vec![]);
    relay
        .rules
        .add_forwarding_rule("news", vec![100], vec![200])
        .await
        .unwrap();

    relay.dispatcher.handle(new_event(100, 1, "v1")).await;
    assert!(relay.cache.lookup(100, 1).await.is_some());

    relay.rules.remove_forwarding_rule("news").await.unwrap();
    relay
        .rules
        .add_forwarding_rule("news", vec![100], vec![200])
        .await
        .unwrap();

    // The edit must not reach the copy recorded under the old rule.
    relay.dispatcher.handle(edit_event(100, 1, "v2")).await;
    assert!(
        !relay
            .transport
            .deliveries()
            .await
            .iter()
            .any(|d| matches!(d, Delivered::Edited { .. }))
    );
}

#[tokio::test]
async fn rules_added_by_command_take_effect() {
    let relay = relay_with(vec![]);
    let commands = CommandHandler::new(relay.rules.clone());

    let reply = timeout(
        TEST_TIMEOUT,
        commands.handle("/forward add breaking 123456 -> 200"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(reply.contains("✅"));

    // Origin arrives in the long form; the rule was added in the short form.
    relay
        .dispatcher
        .handle(new_event(-100123456, 1, "it happened"))
        .await;

    assert_eq!(relay.transport.deliveries().await.len(), 1);
}
