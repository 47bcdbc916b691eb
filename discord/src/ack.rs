//! Acknowledgment sinks for the two trigger sources.

use std::sync::Arc;

use async_trait::async_trait;
use rolegate_types::{AckSink, ChannelId};
use tracing::debug;

use crate::rest::DiscordRest;

/// Replies to a slash-command interaction.
///
/// The first `reply` consumes the interaction callback (ephemeral); every
/// later message goes through the interaction webhook as an ephemeral
/// follow-up. Delivery is best-effort: the session outcome does not depend
/// on the originator seeing the acknowledgment.
pub struct InteractionAck {
    rest: Arc<DiscordRest>,
    application_id: String,
    interaction_id: String,
    interaction_token: String,
    replied: bool,
}

impl InteractionAck {
    pub fn new(
        rest: Arc<DiscordRest>,
        application_id: &str,
        interaction_id: &str,
        interaction_token: &str,
    ) -> Self {
        Self {
            rest,
            application_id: application_id.to_string(),
            interaction_id: interaction_id.to_string(),
            interaction_token: interaction_token.to_string(),
            replied: false,
        }
    }
}

#[async_trait]
impl AckSink for InteractionAck {
    async fn reply(&mut self, text: &str) {
        let result = if self.replied {
            self.rest
                .interaction_follow_up(&self.application_id, &self.interaction_token, text)
                .await
        } else {
            self.replied = true;
            self.rest
                .interaction_callback(&self.interaction_id, &self.interaction_token, text)
                .await
        };
        if let Err(e) = result {
            debug!(error = %e, "interaction reply not delivered");
        }
    }

    async fn follow_up(&mut self, text: &str) {
        if let Err(e) = self
            .rest
            .interaction_follow_up(&self.application_id, &self.interaction_token, text)
            .await
        {
            debug!(error = %e, "interaction follow-up not delivered");
        }
    }
}

/// Replies in the channel a text command was typed in. Channel messages
/// have no ephemeral equivalent; this is the `!verify` fallback path.
pub struct ChannelAck {
    rest: Arc<DiscordRest>,
    channel: ChannelId,
}

impl ChannelAck {
    pub fn new(rest: Arc<DiscordRest>, channel: ChannelId) -> Self {
        Self { rest, channel }
    }

    async fn post(&self, text: &str) {
        if let Err(e) = self.rest.create_message(self.channel, text).await {
            debug!(error = %e, channel = %self.channel, "channel reply not delivered");
        }
    }
}

#[async_trait]
impl AckSink for ChannelAck {
    async fn reply(&mut self, text: &str) {
        self.post(text).await;
    }

    async fn follow_up(&mut self, text: &str) {
        self.post(text).await;
    }
}
