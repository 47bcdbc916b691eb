//! Implementations of the core collaborator contracts on top of the REST
//! client and the message router.

use std::sync::Arc;

use async_trait::async_trait;
use rolegate_types::{
    ChannelError, ChannelId, DmChannel, GatewayError, GrantCheck, GuildId, InboundMessage,
    RoleGateway, RoleId, UserId,
};
use tokio::sync::mpsc;

use crate::error::DiscordError;
use crate::rest::DiscordRest;
use crate::router::MessageRouter;
use crate::wire::{permission, Role};

/// Union of the permission bits across the bot's roles.
///
/// The @everyone role shares the guild's id and always counts, since
/// members never list it explicitly.
pub fn aggregate_permissions(
    guild: GuildId,
    bot_role_ids: &[RoleId],
    guild_roles: &[Role],
) -> u64 {
    guild_roles
        .iter()
        .filter(|r| r.id.as_u64() == guild.as_u64() || bot_role_ids.contains(&r.id))
        .fold(0u64, |acc, r| acc | r.permission_bits())
}

/// Decide whether the bot can confer `target` at all.
///
/// The bot needs Manage Roles (or Administrator) in its aggregated role
/// permissions, and the target role must sit strictly below the bot's
/// highest role.
pub fn evaluate_grant(
    guild: GuildId,
    bot_role_ids: &[RoleId],
    guild_roles: &[Role],
    target: RoleId,
) -> Result<GrantCheck, GatewayError> {
    let target_role = guild_roles
        .iter()
        .find(|r| r.id == target)
        .ok_or(GatewayError::RoleNotFound(target))?;

    let permissions = aggregate_permissions(guild, bot_role_ids, guild_roles);
    if permissions & (permission::MANAGE_ROLES | permission::ADMINISTRATOR) == 0 {
        return Ok(GrantCheck::MissingPermission);
    }

    let highest = guild_roles
        .iter()
        .filter(|r| r.id.as_u64() == guild.as_u64() || bot_role_ids.contains(&r.id))
        .map(|r| r.position)
        .max()
        .unwrap_or(0);
    if target_role.position >= highest {
        return Ok(GrantCheck::RoleOrderTooHigh);
    }
    Ok(GrantCheck::Allowed)
}

/// [`RoleGateway`] backed by the Discord REST API, scoped to one guild and
/// one grantable role.
pub struct DiscordRoleGateway {
    rest: Arc<DiscordRest>,
    guild: GuildId,
    role: RoleId,
    bot_user: UserId,
}

impl DiscordRoleGateway {
    pub fn new(rest: Arc<DiscordRest>, guild: GuildId, role: RoleId, bot_user: UserId) -> Self {
        Self {
            rest,
            guild,
            role,
            bot_user,
        }
    }

    fn member_error(&self, user: UserId, e: DiscordError) -> GatewayError {
        match e {
            DiscordError::ApiStatus { status: 404, .. } => GatewayError::MemberNotFound(user),
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl RoleGateway for DiscordRoleGateway {
    async fn has_role(&self, user: UserId) -> Result<bool, GatewayError> {
        let member = self
            .rest
            .fetch_member(self.guild, user)
            .await
            .map_err(|e| self.member_error(user, e))?;
        Ok(member.roles.contains(&self.role))
    }

    async fn grant_role(&self, user: UserId) -> Result<(), GatewayError> {
        self.rest
            .add_member_role(self.guild, user, self.role)
            .await
            .map_err(|e| self.member_error(user, e))
    }

    async fn can_grant(&self) -> Result<GrantCheck, GatewayError> {
        let guild = self.rest.fetch_guild(self.guild).await.map_err(|e| match e {
            DiscordError::ApiStatus { status: 404, .. } => {
                GatewayError::GuildNotFound(self.guild)
            }
            other => GatewayError::Transport(other.to_string()),
        })?;
        let roles = self
            .rest
            .fetch_roles(self.guild)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let me = self
            .rest
            .fetch_member(self.guild, self.bot_user)
            .await
            .map_err(|e| self.member_error(self.bot_user, e))?;
        evaluate_grant(guild.id, &me.roles, &roles, self.role)
    }

    async fn is_pending(&self, user: UserId) -> Result<bool, GatewayError> {
        let member = self
            .rest
            .fetch_member(self.guild, user)
            .await
            .map_err(|e| self.member_error(user, e))?;
        Ok(member.pending)
    }
}

/// [`DmChannel`] backed by the Discord REST API for delivery and the
/// gateway [`MessageRouter`] for inbound subscriptions.
pub struct DiscordDmChannel {
    rest: Arc<DiscordRest>,
    router: Arc<MessageRouter>,
}

impl DiscordDmChannel {
    pub fn new(rest: Arc<DiscordRest>, router: Arc<MessageRouter>) -> Self {
        Self { rest, router }
    }
}

#[async_trait]
impl DmChannel for DiscordDmChannel {
    async fn open(&self, user: UserId) -> Result<ChannelId, ChannelError> {
        let channel = self
            .rest
            .create_dm(user)
            .await
            .map_err(|e| ChannelError::CannotOpen(e.to_string()))?;
        Ok(channel.id)
    }

    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), ChannelError> {
        self.rest
            .create_message(channel, text)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn subscribe(
        &self,
        channel: ChannelId,
        author: UserId,
    ) -> mpsc::Receiver<InboundMessage> {
        self.router.subscribe(channel, author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: u64, position: i64, permissions: u64) -> Role {
        Role {
            id: RoleId::new(id),
            name: String::new(),
            position,
            permissions: permissions.to_string(),
        }
    }

    const GUILD: u64 = 100;

    fn guild_roles() -> Vec<Role> {
        vec![
            role(GUILD, 0, 0), // @everyone
            role(200, 5, permission::MANAGE_ROLES),
            role(300, 3, 0), // grantable target
            role(400, 8, 0), // above the bot
        ]
    }

    #[test]
    fn aggregation_unions_member_roles_and_everyone() {
        let mut roles = guild_roles();
        roles[0].permissions = permission::MANAGE_MESSAGES.to_string();
        let bits = aggregate_permissions(GuildId::new(GUILD), &[RoleId::new(200)], &roles);
        assert_eq!(bits, permission::MANAGE_MESSAGES | permission::MANAGE_ROLES);
    }

    #[test]
    fn aggregation_ignores_roles_the_bot_does_not_hold() {
        let mut roles = guild_roles();
        roles[3].permissions = permission::ADMINISTRATOR.to_string();
        let bits = aggregate_permissions(GuildId::new(GUILD), &[RoleId::new(300)], &roles);
        assert_eq!(bits, 0);
    }

    #[test]
    fn manage_roles_and_lower_target_allows_grant() {
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(200)],
            &guild_roles(),
            RoleId::new(300),
        )
        .unwrap();
        assert_eq!(check, GrantCheck::Allowed);
    }

    #[test]
    fn missing_manage_roles_is_detected() {
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(300)],
            &guild_roles(),
            RoleId::new(300),
        )
        .unwrap();
        assert_eq!(check, GrantCheck::MissingPermission);
    }

    #[test]
    fn administrator_satisfies_the_permission_requirement() {
        let mut roles = guild_roles();
        roles[1].permissions = permission::ADMINISTRATOR.to_string();
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(200)],
            &roles,
            RoleId::new(300),
        )
        .unwrap();
        assert_eq!(check, GrantCheck::Allowed);
    }

    #[test]
    fn target_at_or_above_bot_highest_is_blocked() {
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(200)],
            &guild_roles(),
            RoleId::new(400),
        )
        .unwrap();
        assert_eq!(check, GrantCheck::RoleOrderTooHigh);

        // Equal position is not strictly below either.
        let mut roles = guild_roles();
        roles[2].position = 5;
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(200)],
            &roles,
            RoleId::new(300),
        )
        .unwrap();
        assert_eq!(check, GrantCheck::RoleOrderTooHigh);
    }

    #[test]
    fn unknown_target_role_is_an_error() {
        let err = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(200)],
            &guild_roles(),
            RoleId::new(999),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::RoleNotFound(r) if r == RoleId::new(999)));
    }

    #[test]
    fn everyone_permissions_count_for_the_bot() {
        let mut roles = guild_roles();
        roles[0].permissions = permission::MANAGE_ROLES.to_string();
        let check = evaluate_grant(
            GuildId::new(GUILD),
            &[RoleId::new(300)],
            &roles,
            RoleId::new(300),
        )
        .unwrap();
        // @everyone grants the permission, but the target equals the bot's
        // highest role (position 3), so the order check still blocks it.
        assert_eq!(check, GrantCheck::RoleOrderTooHigh);
    }
}
