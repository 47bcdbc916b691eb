//! Wire types for the Discord gateway and REST API (v10).

use rolegate_types::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serde::{Deserialize, Serialize};

pub const API_BASE: &str = "https://discord.com/api/v10";
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway opcodes.
pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Gateway intent bits for the events this bot consumes.
pub mod intent {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MEMBERS: u64 = 1 << 1;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const DIRECT_MESSAGES: u64 = 1 << 12;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;

    pub const ALL: u64 =
        GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT;
}

/// Permission bits (the few this bot cares about).
pub mod permission {
    pub const ADMINISTRATOR: u64 = 1 << 3;
    pub const MANAGE_MESSAGES: u64 = 1 << 13;
    pub const MANAGE_ROLES: u64 = 1 << 28;
}

/// One frame on the gateway socket, either direction.
#[derive(Debug, Deserialize)]
pub struct GatewayFrame {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// Discord serializes the permissions bitfield as a decimal string.
#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    pub id: RoleId,
    #[serde(default)]
    pub name: String,
    pub position: i64,
    #[serde(default)]
    pub permissions: String,
}

impl Role {
    pub fn permission_bits(&self) -> u64 {
        self.permissions.parse().unwrap_or(0)
    }
}

/// A guild member. `roles` never includes the implicit @everyone role;
/// `pending` is set while membership screening is unfinished.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreate {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionCreate {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub data: Option<InteractionData>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

impl InteractionCreate {
    /// The invoking user, whether the interaction arrived from a guild
    /// (`member.user`) or a DM (`user`).
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
    pub user: User,
}

/// Body for the guild slash-command bulk overwrite.
#[derive(Debug, Serialize)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_permissions_parse_from_decimal_string() {
        let json = r#"{"id":"3","name":"Verified","position":5,"permissions":"268435456"}"#;
        let role: Role = serde_json::from_str(json).unwrap();
        assert_eq!(role.permission_bits(), permission::MANAGE_ROLES);
    }

    #[test]
    fn member_defaults_pending_to_false() {
        let json = r#"{"roles":["1","2"]}"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert!(!member.pending);
        assert_eq!(member.roles.len(), 2);
    }

    #[test]
    fn interaction_invoker_prefers_guild_member() {
        let json = r#"{
            "id": "9", "token": "tok",
            "member": {"user": {"id": "11"}, "roles": []},
            "user": {"id": "99"}
        }"#;
        let interaction: InteractionCreate = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.invoker().unwrap().id, UserId::new(11));
    }

    #[test]
    fn interaction_invoker_falls_back_to_dm_user() {
        let json = r#"{"id": "9", "token": "tok", "user": {"id": "99"}}"#;
        let interaction: InteractionCreate = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.invoker().unwrap().id, UserId::new(99));
    }

    #[test]
    fn dispatch_frame_carries_sequence_and_type() {
        let json = r#"{"op":0,"s":42,"t":"MESSAGE_CREATE","d":{}}"#;
        let frame: GatewayFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.op, op::DISPATCH);
        assert_eq!(frame.s, Some(42));
        assert_eq!(frame.t.as_deref(), Some("MESSAGE_CREATE"));
    }

    #[test]
    fn hello_frame_decodes_heartbeat_interval() {
        let json = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        let frame: GatewayFrame = serde_json::from_str(json).unwrap();
        let hello: Hello = serde_json::from_value(frame.d).unwrap();
        assert_eq!(hello.heartbeat_interval, 41250);
    }
}
