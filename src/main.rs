use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing::warn;

use chanrelay::cache::{self, EditSyncCache};
use chanrelay::commands::CommandHandler;
use chanrelay::config::RelayConfig;
use chanrelay::dispatch::Dispatcher;
use chanrelay::error::Result;
use chanrelay::persist::{JsonFileStore, SnapshotStore};
use chanrelay::rules::RuleStore;
use chanrelay::transport::telegram::{self, TelegramTransport};
use chanrelay::transport::{RelayEvent, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::default();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    let rules_path = std::env::var("CHANRELAY_RULES_PATH")
        .unwrap_or_else(|_| "./data/rules.json".to_string());

    // Chat whose messages are treated as rule-management commands.
    let admin_chat: Option<i64> = std::env::var("CHANRELAY_ADMIN_CHAT")
        .ok()
        .and_then(|v| v.parse().ok());

    eprintln!("🔁 chanrelay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Rules: {rules_path}");
    match admin_chat {
        Some(chat) => eprintln!("   Admin chat: {chat}"),
        None => eprintln!("   Admin chat: (not set — command interface disabled)"),
    }

    // ── Wiring ───────────────────────────────────────────────────────
    let snapshot_store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&rules_path));
    let rules = RuleStore::load(snapshot_store).await?;

    let cache = EditSyncCache::new(rules.clone());
    cache::spawn_sweep_task(cache.clone(), config.sweep_interval);

    let transport = Arc::new(TelegramTransport::new(
        SecretString::from(bot_token),
        config.poll_timeout,
    ));
    let dispatcher = Dispatcher::new(rules.clone(), cache, transport.clone());
    let commands = CommandHandler::new(rules);

    // ── Event flow ───────────────────────────────────────────────────
    // Poller → command interception → dispatcher.
    let (raw_tx, mut raw_rx) = mpsc::channel(config.event_queue_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);

    telegram::spawn_poller(transport.clone(), raw_tx);

    tokio::spawn(async move {
        while let Some(event) = raw_rx.recv().await {
            // Messages in the admin chat may be commands; everything else
            // flows through to the relay.
            if let RelayEvent::New(msg) = &event
                && Some(msg.origin_id) == admin_chat
                && let Some(reply) = commands.handle(&msg.text).await
            {
                if let Err(e) = transport.send(msg.origin_id, &reply).await {
                    warn!(error = %e, "Failed to send command reply");
                }
                continue;
            }
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    dispatcher.run(event_rx).await;
    Ok(())
}
