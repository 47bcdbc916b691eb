//! Direct-message channel contract.

use crate::ids::{ChannelId, UserId};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failures surfaced by a [`DmChannel`] implementation.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The DM channel could not be opened (recipient blocks DMs, etc.).
    #[error("cannot open DM channel: {0}")]
    CannotOpen(String),

    /// A message could not be delivered. Non-fatal for notices; fatal only
    /// for the initial prompt.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// An inbound message observed on a subscribed channel.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub author: UserId,
    pub content: String,
}

/// Operations the verification core needs from the messaging platform.
///
/// A session owns its channel exclusively: it opens the DM, sends the
/// prompt and notices, and consumes one inbound subscription. Dropping the
/// subscription receiver cancels it; cancelling twice is a no-op.
#[async_trait]
pub trait DmChannel: Send + Sync {
    /// Open (or reuse) the DM channel for a user.
    async fn open(&self, user: UserId) -> Result<ChannelId, ChannelError>;

    /// Send a text message to a channel.
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), ChannelError>;

    /// Subscribe to inbound messages on `channel` authored by `author`.
    ///
    /// Messages arrive in order. The subscription ends when the returned
    /// receiver is dropped.
    async fn subscribe(&self, channel: ChannelId, author: UserId)
        -> mpsc::Receiver<InboundMessage>;
}
