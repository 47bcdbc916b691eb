//! Role gateway contract.
//!
//! The session core never talks to the platform directly. It consumes this
//! trait, scoped to one `(guild, role)` pair by the implementation. Every
//! operation distinguishes a negative answer (`Ok(false)`) from a transport
//! or permission failure (`Err`), which the core reports differently.

use crate::ids::{GuildId, RoleId, UserId};
use async_trait::async_trait;
use thiserror::Error;

/// Failures surfaced by a [`RoleGateway`] implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("guild {0} not found")]
    GuildNotFound(GuildId),

    #[error("role {0} does not exist in this guild")]
    RoleNotFound(RoleId),

    #[error("member {0} not found in guild")]
    MemberNotFound(UserId),

    /// Transport-level failure (HTTP error, rate limit, API error code).
    /// The message is safe to forward to the user as a diagnostic.
    #[error("gateway error: {0}")]
    Transport(String),
}

/// Whether the grantor is able to confer the target role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantCheck {
    /// The grant can proceed.
    Allowed,
    /// The grantor lacks the Manage Roles capability.
    MissingPermission,
    /// The target role is not strictly below the grantor's highest role.
    RoleOrderTooHigh,
}

/// Operations the verification core needs from the privilege system.
#[async_trait]
pub trait RoleGateway: Send + Sync {
    /// Whether the user currently holds the target role.
    async fn has_role(&self, user: UserId) -> Result<bool, GatewayError>;

    /// Grant the target role to the user.
    ///
    /// Callers must not trust success here: re-read [`has_role`] afterwards
    /// to confirm the grant took effect.
    ///
    /// [`has_role`]: RoleGateway::has_role
    async fn grant_role(&self, user: UserId) -> Result<(), GatewayError>;

    /// Check the grantor's permission level and relative role ordering.
    async fn can_grant(&self) -> Result<GrantCheck, GatewayError>;

    /// Whether the user has not yet passed membership screening
    /// (rules acceptance). Role grants do not take effect while pending.
    async fn is_pending(&self, user: UserId) -> Result<bool, GatewayError>;
}
