//! Transport abstraction for the messaging platform.
//!
//! The relay core never talks to the platform directly — it goes through the
//! [`Transport`] trait. Adapters are pure I/O: session handling, request
//! encoding, and error mapping live here; routing and transformation live in
//! the dispatcher.

pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

pub use telegram::TelegramTransport;

/// Platform-native channel identifier.
pub type ChatId = i64;

/// Platform-native message identifier.
pub type MessageId = i64;

// ── Inbound events ──────────────────────────────────────────────────

/// A message as delivered by the platform update feed.
///
/// `text` carries the body for plain messages and the caption for
/// media-bearing ones — the platform reports whichever is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel the message was posted in.
    pub origin_id: ChatId,
    /// Platform message id within that channel.
    pub message_id: MessageId,
    /// Body text or media caption (empty when neither is present).
    pub text: String,
    /// Whether the message carries media (photo, video, document, ...).
    pub has_media: bool,
}

/// An event consumed by the dispatcher loop.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A newly posted message.
    New(InboundMessage),
    /// An edit to a previously posted message.
    Edited(InboundMessage),
}

// ── Transport trait ─────────────────────────────────────────────────

/// Messaging-platform client operations used by the dispatcher.
///
/// Every method may fail per-call with a [`DeliveryError`]; the caller treats
/// that as a local failure, never as fatal.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message. Returns the produced message id.
    async fn send(&self, dest: ChatId, text: &str) -> Result<MessageId, DeliveryError>;

    /// Forward a message verbatim. Returns the produced message id.
    async fn forward(
        &self,
        dest: ChatId,
        origin: ChatId,
        message_id: MessageId,
    ) -> Result<MessageId, DeliveryError>;

    /// Re-post a media message with a replacement caption.
    /// Returns the produced message id.
    async fn copy(
        &self,
        dest: ChatId,
        origin: ChatId,
        message_id: MessageId,
        caption: &str,
    ) -> Result<MessageId, DeliveryError>;

    /// Replace the text of a previously produced message.
    async fn edit(
        &self,
        dest: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), DeliveryError>;
}
