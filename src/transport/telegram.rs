//! Telegram transport — Bot API over HTTP, long-polling for updates.
//!
//! Pure I/O adapter: request encoding, response decoding, and error mapping.
//! Routing and text transformation never reach this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::transport::{ChatId, InboundMessage, MessageId, RelayEvent, Transport};

/// Pause between polls after a transport error, so a broken network doesn't
/// spin the loop.
const POLL_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram Bot API client.
pub struct TelegramTransport {
    bot_token: SecretString,
    client: reqwest::Client,
    poll_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(bot_token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            poll_timeout,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a method call and decode the standard `{ok, result}` envelope.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, DeliveryError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        let status = resp.status();
        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Http(format!("{method} decode failed: {e}")))?;

        if !envelope.ok {
            return Err(DeliveryError::Http(format!(
                "{method} failed ({status}): {}",
                envelope.description.unwrap_or_default()
            )));
        }
        envelope
            .result
            .ok_or_else(|| DeliveryError::Http(format!("{method} returned no result")))
    }

    // ── Update feed ─────────────────────────────────────────────────

    /// Long-poll `getUpdates` and push relay events into `tx` until the
    /// receiver side closes.
    pub async fn poll_updates(&self, tx: mpsc::Sender<RelayEvent>) {
        info!("Telegram update poller started");
        let mut offset: i64 = 0;

        loop {
            let body = json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": [
                    "message", "edited_message",
                    "channel_post", "edited_channel_post",
                ],
            });

            let updates: Vec<Update> = match self.call("getUpdates", body).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(POLL_RETRY_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(event) = event_from_update(update) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    info!("Event queue closed, stopping Telegram poller");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, dest: ChatId, text: &str) -> Result<MessageId, DeliveryError> {
        let sent: TgMessage = self
            .call("sendMessage", json!({ "chat_id": dest, "text": text }))
            .await
            .map_err(|e| DeliveryError::SendFailed {
                chat_id: dest,
                reason: e.to_string(),
            })?;
        debug!(dest, message_id = sent.message_id, "Telegram message sent");
        Ok(sent.message_id)
    }

    async fn forward(
        &self,
        dest: ChatId,
        origin: ChatId,
        message_id: MessageId,
    ) -> Result<MessageId, DeliveryError> {
        let sent: TgMessage = self
            .call(
                "forwardMessage",
                json!({
                    "chat_id": dest,
                    "from_chat_id": origin,
                    "message_id": message_id,
                }),
            )
            .await
            .map_err(|e| DeliveryError::ForwardFailed {
                chat_id: dest,
                reason: e.to_string(),
            })?;
        Ok(sent.message_id)
    }

    async fn copy(
        &self,
        dest: ChatId,
        origin: ChatId,
        message_id: MessageId,
        caption: &str,
    ) -> Result<MessageId, DeliveryError> {
        // copyMessage re-posts the media under the bot's name, which is what
        // lets the caption be replaced.
        let copied: CopiedMessage = self
            .call(
                "copyMessage",
                json!({
                    "chat_id": dest,
                    "from_chat_id": origin,
                    "message_id": message_id,
                    "caption": caption,
                }),
            )
            .await
            .map_err(|e| DeliveryError::SendFailed {
                chat_id: dest,
                reason: e.to_string(),
            })?;
        Ok(copied.message_id)
    }

    async fn edit(
        &self,
        dest: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        // editMessageText returns the edited message (or `true` for inline
        // messages); the payload isn't needed.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": dest,
                    "message_id": message_id,
                    "text": text,
                }),
            )
            .await
            .map_err(|e| DeliveryError::EditFailed {
                chat_id: dest,
                message_id,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Spawn the update poller on its own task.
pub fn spawn_poller(
    transport: Arc<TelegramTransport>,
    tx: mpsc::Sender<RelayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        transport.poll_updates(tx).await;
    })
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    edited_message: Option<TgMessage>,
    channel_post: Option<TgMessage>,
    edited_channel_post: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: MessageId,
    #[serde(default)]
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<serde_json::Value>,
    video: Option<serde_json::Value>,
    document: Option<serde_json::Value>,
    animation: Option<serde_json::Value>,
    audio: Option<serde_json::Value>,
    voice: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct TgChat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct CopiedMessage {
    message_id: MessageId,
}

impl TgMessage {
    fn has_media(&self) -> bool {
        self.photo.is_some()
            || self.video.is_some()
            || self.document.is_some()
            || self.animation.is_some()
            || self.audio.is_some()
            || self.voice.is_some()
    }

    fn into_inbound(self) -> InboundMessage {
        let has_media = self.has_media();
        InboundMessage {
            origin_id: self.chat.id,
            message_id: self.message_id,
            text: self.text.or(self.caption).unwrap_or_default(),
            has_media,
        }
    }
}

/// Convert one update into a relay event. Updates that carry neither a new
/// nor an edited message are dropped.
fn event_from_update(update: Update) -> Option<RelayEvent> {
    if let Some(msg) = update.message.or(update.channel_post) {
        return Some(RelayEvent::New(msg.into_inbound()));
    }
    if let Some(msg) = update.edited_message.or(update.edited_channel_post) {
        return Some(RelayEvent::Edited(msg.into_inbound()));
    }
    None
}
