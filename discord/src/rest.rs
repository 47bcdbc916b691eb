//! HTTP client for the Discord REST API.

use std::time::Duration;

use rolegate_types::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serde_json::json;

use crate::error::DiscordError;
use crate::wire::{Channel, CommandDefinition, Guild, Member, Role, API_BASE};

/// Default timeout for REST requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ephemeral message flag: only the invoking user sees the reply.
const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Interaction callback type for an immediate channel message.
const CALLBACK_CHANNEL_MESSAGE: u8 = 4;

/// Client for the Discord REST API (reusable connection pool).
///
/// Every request carries the bot token in the `Authorization` header. The
/// base URL is swappable so the client can be pointed at a local stub.
pub struct DiscordRest {
    http_client: reqwest::Client,
    base: String,
    token: String,
}

impl DiscordRest {
    pub fn new(token: &str) -> Self {
        Self::with_base(API_BASE, token)
    }

    pub fn with_base(base: &str, token: &str) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// `GET /guilds/{guild}`
    pub async fn fetch_guild(&self, guild: GuildId) -> Result<Guild, DiscordError> {
        let url = format!("{}/guilds/{guild}", self.base);
        self.get_json(&url).await
    }

    /// `GET /guilds/{guild}/members/{user}`
    pub async fn fetch_member(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> Result<Member, DiscordError> {
        let url = format!("{}/guilds/{guild}/members/{user}", self.base);
        self.get_json(&url).await
    }

    /// `GET /guilds/{guild}/roles`
    pub async fn fetch_roles(&self, guild: GuildId) -> Result<Vec<Role>, DiscordError> {
        let url = format!("{}/guilds/{guild}/roles", self.base);
        self.get_json(&url).await
    }

    /// `PUT /guilds/{guild}/members/{user}/roles/{role}`
    pub async fn add_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
    ) -> Result<(), DiscordError> {
        let url = format!("{}/guilds/{guild}/members/{user}/roles/{role}", self.base);
        let request = self
            .http_client
            .put(&url)
            .header("Authorization", self.auth_header());
        let response = request.send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }

    /// `POST /users/@me/channels` — open (or reuse) the DM channel to a user.
    pub async fn create_dm(&self, user: UserId) -> Result<Channel, DiscordError> {
        let url = format!("{}/users/@me/channels", self.base);
        let body = json!({ "recipient_id": user });
        self.post_json(&url, &body).await
    }

    /// `POST /channels/{channel}/messages`
    pub async fn create_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<(), DiscordError> {
        let url = format!("{}/channels/{channel}/messages", self.base);
        let body = json!({ "content": content });
        self.post_ok(&url, &body).await
    }

    /// `DELETE /channels/{channel}/messages/{message}`
    pub async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), DiscordError> {
        let url = format!("{}/channels/{channel}/messages/{message}", self.base);
        let request = self
            .http_client
            .delete(&url)
            .header("Authorization", self.auth_header());
        let response = request.send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }

    /// `POST /interactions/{id}/{token}/callback` — ephemeral reply.
    pub async fn interaction_callback(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/interactions/{interaction_id}/{interaction_token}/callback",
            self.base
        );
        let body = json!({
            "type": CALLBACK_CHANNEL_MESSAGE,
            "data": { "content": content, "flags": FLAG_EPHEMERAL },
        });
        self.post_ok(&url, &body).await
    }

    /// `POST /webhooks/{application_id}/{token}` — ephemeral follow-up,
    /// usable after the initial callback was consumed.
    pub async fn interaction_follow_up(
        &self,
        application_id: &str,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}",
            self.base
        );
        let body = json!({ "content": content, "flags": FLAG_EPHEMERAL });
        self.post_ok(&url, &body).await
    }

    /// `PUT /applications/{application_id}/guilds/{guild}/commands` —
    /// bulk-overwrite the guild's slash commands.
    pub async fn overwrite_guild_commands(
        &self,
        application_id: &str,
        guild: GuildId,
        commands: &[CommandDefinition],
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/applications/{application_id}/guilds/{guild}/commands",
            self.base
        );
        let request = self
            .http_client
            .put(&url)
            .header("Authorization", self.auth_header())
            .json(commands);
        let response = request.send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, DiscordError> {
        let request = self
            .http_client
            .get(url)
            .header("Authorization", self.auth_header());
        let response = request.send().await.map_err(map_transport)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| DiscordError::InvalidResponse(e.to_string()))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, DiscordError> {
        let request = self
            .http_client
            .post(url)
            .header("Authorization", self.auth_header())
            .json(body);
        let response = request.send().await.map_err(map_transport)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| DiscordError::InvalidResponse(e.to_string()))
    }

    async fn post_ok(&self, url: &str, body: &serde_json::Value) -> Result<(), DiscordError> {
        let request = self
            .http_client
            .post(url)
            .header("Authorization", self.auth_header())
            .json(body);
        let response = request.send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }
}

fn map_transport(e: reqwest::Error) -> DiscordError {
    if e.is_timeout() {
        DiscordError::Unreachable(format!("request timed out: {e}"))
    } else if e.is_connect() {
        DiscordError::Unreachable(format!("connection failed: {e}"))
    } else {
        DiscordError::RequestFailed(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DiscordError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DiscordError::ApiStatus {
        status: status.as_u16(),
        body,
    })
}
