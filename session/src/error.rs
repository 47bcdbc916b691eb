use rolegate_types::{GatewayError, GuildId, RoleId};
use thiserror::Error;

/// Failures surfaced to the caller of `SessionManager::trigger`.
///
/// All of these are terminal for that invocation and none leave a registered
/// session behind.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("guild {0} not found")]
    GuildNotFound(GuildId),

    #[error("the configured verify role {0} does not exist in this guild")]
    RoleNotFound(RoleId),

    #[error("the bot is missing the Manage Roles permission")]
    MissingPermission,

    #[error("the verify role is not below the bot's highest role")]
    RoleOrderTooHigh,

    #[error("a verification session is already in progress")]
    AlreadyInProgress,

    #[error("gateway error: {0}")]
    Gateway(String),
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::GuildNotFound(guild) => Self::GuildNotFound(guild),
            GatewayError::RoleNotFound(role) => Self::RoleNotFound(role),
            other => Self::Gateway(other.to_string()),
        }
    }
}
