use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("bot token is malformed: {0}")]
    MalformedToken(String),

    #[error("token does not belong to application {0}")]
    TokenApplicationMismatch(String),

    #[error("HTTP request to Discord failed: {0}")]
    RequestFailed(String),

    #[error("Discord API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("invalid response from Discord: {0}")]
    InvalidResponse(String),

    #[error("Discord API unreachable: {0}")]
    Unreachable(String),

    #[error("gateway connection failed: {0}")]
    GatewayConnect(String),

    #[error("gateway protocol violation: {0}")]
    GatewayProtocol(String),
}
