//! Discord platform glue.
//!
//! Everything that talks to Discord lives here: the REST client, the
//! gateway websocket client, the inbound message router, and the adapters
//! that implement the collaborator contracts from `rolegate-types` on top
//! of them. The verification core never imports this crate.

pub mod ack;
pub mod adapter;
pub mod error;
pub mod gateway;
pub mod rest;
pub mod router;
pub mod token;
pub mod wire;

pub use ack::{ChannelAck, InteractionAck};
pub use adapter::{DiscordDmChannel, DiscordRoleGateway};
pub use error::DiscordError;
pub use gateway::{GatewayClient, GatewayEvent};
pub use rest::DiscordRest;
pub use router::MessageRouter;
