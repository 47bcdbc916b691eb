//! Fundamental types for rolegate.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: snowflake identifiers, timestamps, verification parameters,
//! and the collaborator contracts (role gateway, DM channel, acknowledgment
//! sink) that the session core consumes.

pub mod ack;
pub mod channel;
pub mod gateway;
pub mod ids;
pub mod params;
pub mod time;

pub use ack::AckSink;
pub use channel::{ChannelError, DmChannel, InboundMessage};
pub use gateway::{GatewayError, GrantCheck, RoleGateway};
pub use ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
pub use params::VerifyParams;
pub use time::Timestamp;
