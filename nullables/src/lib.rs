//! Nullable infrastructure for deterministic testing.
//!
//! All external collaborators (role gateway, DM channel, acknowledgment
//! sink) are abstracted behind traits in `rolegate-types`. This crate
//! provides test-friendly implementations that:
//! - Return deterministic, programmable values
//! - Record every call for assertions
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod ack;
pub mod channel;
pub mod gateway;

pub use ack::{AckLog, NullAckSink};
pub use channel::NullDmChannel;
pub use gateway::NullRoleGateway;
