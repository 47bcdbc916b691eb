//! Routes gateway MESSAGE_CREATE events to per-session subscriptions.

use std::sync::Mutex;

use rolegate_types::{ChannelId, InboundMessage, UserId};
use tokio::sync::mpsc;

use crate::wire::MessageCreate;

/// Per-session inbound queue depth. A session accepts at most a handful of
/// candidate codes, so a small buffer is plenty.
const SUBSCRIPTION_DEPTH: usize = 16;

struct Subscription {
    channel: ChannelId,
    author: UserId,
    tx: mpsc::Sender<InboundMessage>,
}

/// Fan-out point between the single gateway read loop and the per-session
/// collection loops.
///
/// Subscriptions are scoped to a `(channel, author)` pair; messages from
/// other authors in the same channel are never delivered. Closed
/// subscriptions are pruned lazily on the next dispatch.
pub struct MessageRouter {
    subs: Mutex<Vec<Subscription>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(
        &self,
        channel: ChannelId,
        author: UserId,
    ) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_DEPTH);
        self.subs.lock().unwrap_or_else(|e| e.into_inner()).push(Subscription {
            channel,
            author,
            tx,
        });
        rx
    }

    /// Deliver a gateway message to the matching subscriptions.
    ///
    /// Returns `true` if at least one live subscription accepted it. Bot
    /// authors are dropped at the door so the bot's own prompts never feed
    /// back into a session.
    pub fn dispatch(&self, message: &MessageCreate) -> bool {
        if message.author.bot {
            return false;
        }
        let inbound = InboundMessage {
            author: message.author.id,
            content: message.content.clone(),
        };
        let mut delivered = false;
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|sub| {
            if sub.channel != message.channel_id || sub.author != message.author.id {
                return true;
            }
            match sub.tx.try_send(inbound.clone()) {
                Ok(()) => {
                    delivered = true;
                    true
                }
                // Receiver gone: the session reached a terminal state.
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(
                        channel = %sub.channel,
                        author = %sub.author,
                        "subscription queue full, message dropped"
                    );
                    true
                }
            }
        });
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        let mut subs = self.subs.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|sub| !sub.tx.is_closed());
        subs.len()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::User;
    use rolegate_types::MessageId;

    fn message(channel: u64, author: u64, content: &str, bot: bool) -> MessageCreate {
        MessageCreate {
            id: MessageId::new(1),
            channel_id: ChannelId::new(channel),
            author: User {
                id: UserId::new(author),
                username: String::new(),
                bot,
            },
            content: content.to_string(),
            guild_id: None,
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_subscription() {
        let router = MessageRouter::new();
        let mut rx = router.subscribe(ChannelId::new(5), UserId::new(7));

        assert!(router.dispatch(&message(5, 7, "hello", false)));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.author, UserId::new(7));
        assert_eq!(received.content, "hello");
    }

    #[tokio::test]
    async fn ignores_other_channels_and_authors() {
        let router = MessageRouter::new();
        let _rx = router.subscribe(ChannelId::new(5), UserId::new(7));

        assert!(!router.dispatch(&message(6, 7, "wrong channel", false)));
        assert!(!router.dispatch(&message(5, 8, "wrong author", false)));
    }

    #[tokio::test]
    async fn drops_bot_messages() {
        let router = MessageRouter::new();
        let _rx = router.subscribe(ChannelId::new(5), UserId::new(7));

        assert!(!router.dispatch(&message(5, 7, "echo of own prompt", true)));
    }

    #[tokio::test]
    async fn prunes_closed_subscriptions() {
        let router = MessageRouter::new();
        let rx = router.subscribe(ChannelId::new(5), UserId::new(7));
        assert_eq!(router.subscription_count(), 1);

        drop(rx);
        assert!(!router.dispatch(&message(5, 7, "too late", false)));
        assert_eq!(router.subscription_count(), 0);
    }
}
