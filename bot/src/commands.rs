//! Command handling: slash `/verify` and text `!verify`.
//!
//! Both sources reduce to the same [`SessionManager::trigger`] call; only
//! the acknowledgment path differs (ephemeral interaction replies vs.
//! channel messages).

use std::sync::{Arc, OnceLock};

use rolegate_discord::adapter::aggregate_permissions;
use rolegate_discord::wire::{permission, CommandDefinition, InteractionCreate, MessageCreate};
use rolegate_discord::{ChannelAck, DiscordError, DiscordRest, InteractionAck, MessageRouter};
use rolegate_session::SessionManager;
use rolegate_types::{AckSink, ChannelId, GuildId, UserId};
use tracing::debug;

use crate::BotConfig;

/// The text-command spelling.
pub const TEXT_TRIGGER: &str = "!verify";

/// The slash-command name.
pub const SLASH_COMMAND: &str = "verify";

const GUILD_ONLY: &str = "This command only works inside the server.";

fn wrong_channel_notice(channel: ChannelId) -> String {
    format!("Please use <#{channel}> to verify.")
}

/// Whether a message body invokes the text command.
pub(crate) fn is_text_trigger(content: &str) -> bool {
    content.trim().eq_ignore_ascii_case(TEXT_TRIGGER)
}

/// Routes gateway events to verification triggers and session input.
pub struct CommandHandler {
    manager: Arc<SessionManager>,
    rest: Arc<DiscordRest>,
    router: Arc<MessageRouter>,
    application_id: String,
    guild: GuildId,
    verify_channel: Option<ChannelId>,
    bot_user: UserId,
    /// Whether the bot may delete messages in the verify channel, resolved
    /// once on first use.
    cleanup_permitted: OnceLock<bool>,
}

impl CommandHandler {
    pub fn new(
        manager: Arc<SessionManager>,
        rest: Arc<DiscordRest>,
        router: Arc<MessageRouter>,
        config: &BotConfig,
        bot_user: UserId,
    ) -> Self {
        Self {
            manager,
            rest,
            router,
            application_id: config.application_id.clone(),
            guild: config.guild_id,
            verify_channel: config.verify_channel_id,
            bot_user,
            cleanup_permitted: OnceLock::new(),
        }
    }

    /// Handle a MESSAGE_CREATE event.
    ///
    /// DMs feed the message router (live sessions pick up their candidate
    /// codes there). Guild messages are only interesting as `!verify`
    /// triggers, and only in the configured verify channel when one is set;
    /// that channel is also kept clean of user messages.
    pub async fn handle_message(&self, message: MessageCreate) {
        if message.author.bot {
            return;
        }
        let Some(guild) = message.guild_id else {
            self.router.dispatch(&message);
            return;
        };
        if guild != self.guild {
            return;
        }

        match self.verify_channel {
            Some(channel) if message.channel_id == channel => {
                if is_text_trigger(&message.content) {
                    self.trigger_from_channel(message.author.id, channel).await;
                }
                // Keep the verify channel clean, but only when the bot
                // actually holds Manage Messages.
                if self.cleanup_permitted().await {
                    if let Err(e) = self.rest.delete_message(channel, message.id).await {
                        debug!(error = %e, message = %message.id, "verify-channel cleanup failed");
                    }
                }
            }
            Some(_) => {
                // Restricted to the verify channel; ignore elsewhere.
            }
            None => {
                if is_text_trigger(&message.content) {
                    self.trigger_from_channel(message.author.id, message.channel_id)
                        .await;
                }
            }
        }
    }

    /// Handle an INTERACTION_CREATE event for the `/verify` command.
    pub async fn handle_interaction(&self, interaction: InteractionCreate) {
        let is_verify = interaction
            .data
            .as_ref()
            .is_some_and(|d| d.name == SLASH_COMMAND);
        if !is_verify {
            return;
        }
        let Some(user) = interaction.invoker().map(|u| u.id) else {
            debug!(interaction = %interaction.id, "interaction without an invoker");
            return;
        };

        let mut ack = InteractionAck::new(
            Arc::clone(&self.rest),
            &self.application_id,
            &interaction.id,
            &interaction.token,
        );

        if interaction.guild_id != Some(self.guild) {
            ack.reply(GUILD_ONLY).await;
            return;
        }
        if let Some(channel) = self.verify_channel {
            if interaction.channel_id != Some(channel) {
                ack.reply(&wrong_channel_notice(channel)).await;
                return;
            }
        }

        self.manager
            .trigger(user, self.guild, Box::new(ack))
            .await;
    }

    /// Whether the bot may delete messages in the verify channel.
    ///
    /// Resolved from the bot's aggregated role permissions and cached; a
    /// failed lookup skips cleanup for this message and retries on the next.
    async fn cleanup_permitted(&self) -> bool {
        if let Some(permitted) = self.cleanup_permitted.get() {
            return *permitted;
        }
        let bits = match self.fetch_own_permissions().await {
            Ok(bits) => bits,
            Err(e) => {
                debug!(error = %e, "could not resolve cleanup permission");
                return false;
            }
        };
        let permitted = bits & (permission::MANAGE_MESSAGES | permission::ADMINISTRATOR) != 0;
        if !permitted {
            tracing::warn!("missing Manage Messages, verify-channel cleanup disabled");
        }
        let _ = self.cleanup_permitted.set(permitted);
        permitted
    }

    async fn fetch_own_permissions(&self) -> Result<u64, DiscordError> {
        let roles = self.rest.fetch_roles(self.guild).await?;
        let me = self.rest.fetch_member(self.guild, self.bot_user).await?;
        Ok(aggregate_permissions(self.guild, &me.roles, &roles))
    }

    async fn trigger_from_channel(&self, user: UserId, channel: ChannelId) {
        let ack = ChannelAck::new(Arc::clone(&self.rest), channel);
        self.manager
            .trigger(user, self.guild, Box::new(ack))
            .await;
    }
}

/// Bulk-overwrite the guild's slash commands with the single `/verify`
/// definition.
pub async fn register_commands(
    rest: &DiscordRest,
    application_id: &str,
    guild: GuildId,
) -> Result<(), DiscordError> {
    rest.overwrite_guild_commands(
        application_id,
        guild,
        &[CommandDefinition {
            name: SLASH_COMMAND,
            description: "Verify yourself to receive the member role",
        }],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_trigger_tolerates_whitespace_and_case() {
        assert!(is_text_trigger("!verify"));
        assert!(is_text_trigger("  !verify  "));
        assert!(is_text_trigger("!VERIFY"));
    }

    #[test]
    fn text_trigger_rejects_other_content() {
        assert!(!is_text_trigger("!verifyy"));
        assert!(!is_text_trigger("please !verify"));
        assert!(!is_text_trigger(""));
    }

    #[test]
    fn wrong_channel_notice_mentions_the_channel() {
        assert_eq!(
            wrong_channel_notice(ChannelId::new(555)),
            "Please use <#555> to verify."
        );
    }
}
