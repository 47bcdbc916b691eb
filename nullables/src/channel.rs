//! Nullable DM channel — in-memory message plumbing for testing.

use async_trait::async_trait;
use rolegate_types::{ChannelError, ChannelId, DmChannel, InboundMessage, UserId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

struct Inner {
    open_error: Option<String>,
    send_error: Option<String>,
    opened: HashMap<UserId, ChannelId>,
    next_channel: u64,
    sent: Vec<(ChannelId, String)>,
    subs: Vec<(ChannelId, UserId, mpsc::Sender<InboundMessage>)>,
}

/// A deterministic [`DmChannel`] for testing.
///
/// Opens allocate sequential channel ids; sends are recorded; tests inject
/// inbound messages with [`push_inbound`].
///
/// [`push_inbound`]: NullDmChannel::push_inbound
pub struct NullDmChannel {
    inner: Mutex<Inner>,
}

impl NullDmChannel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                open_error: None,
                send_error: None,
                opened: HashMap::new(),
                next_channel: 1000,
                sent: Vec::new(),
                subs: Vec::new(),
            }),
        }
    }

    /// Make every `open` fail with the given reason.
    pub fn fail_opens(&self, reason: &str) {
        self.inner.lock().unwrap().open_error = Some(reason.to_string());
    }

    /// Make every `send` fail with the given reason.
    pub fn fail_sends(&self, reason: &str) {
        self.inner.lock().unwrap().send_error = Some(reason.to_string());
    }

    /// Deliver an inbound message to the matching subscriptions.
    ///
    /// Returns `true` if at least one live subscription accepted it.
    pub fn push_inbound(&self, channel: ChannelId, author: UserId, content: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let msg = InboundMessage {
            author,
            content: content.to_string(),
        };
        let mut delivered = false;
        inner.subs.retain(|(chan, user, tx)| {
            if *chan == channel && *user == author {
                match tx.try_send(msg.clone()) {
                    Ok(()) => {
                        delivered = true;
                        true
                    }
                    // Receiver dropped: the subscription is dead, prune it.
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                    Err(mpsc::error::TrySendError::Full(_)) => true,
                }
            } else {
                true
            }
        });
        delivered
    }

    /// The channel id `open` returned (or will return) for a user.
    pub fn channel_for(&self, user: UserId) -> Option<ChannelId> {
        self.inner.lock().unwrap().opened.get(&user).copied()
    }

    /// Every message sent so far, in order.
    pub fn sent_log(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Whether any sent message contains `needle`.
    pub fn sent_contains(&self, needle: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .sent
            .iter()
            .any(|(_, text)| text.contains(needle))
    }

    /// Number of live subscriptions (closed ones are pruned lazily).
    pub fn subscription_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.subs.retain(|(_, _, tx)| !tx.is_closed());
        inner.subs.len()
    }
}

impl Default for NullDmChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DmChannel for NullDmChannel {
    async fn open(&self, user: UserId) -> Result<ChannelId, ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.open_error {
            return Err(ChannelError::CannotOpen(reason.clone()));
        }
        if let Some(existing) = inner.opened.get(&user) {
            return Ok(*existing);
        }
        let channel = ChannelId::new(inner.next_channel);
        inner.next_channel += 1;
        inner.opened.insert(user, channel);
        Ok(channel)
    }

    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = &inner.send_error {
            return Err(ChannelError::SendFailed(reason.clone()));
        }
        inner.sent.push((channel, text.to_string()));
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: ChannelId,
        author: UserId,
    ) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(16);
        self.inner.lock().unwrap().subs.push((channel, author, tx));
        rx
    }
}
