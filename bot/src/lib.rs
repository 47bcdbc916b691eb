//! Bot orchestration.
//!
//! Glues the platform layer (`rolegate-discord`) to the verification core
//! (`rolegate-session`): configuration, command handling, the gateway event
//! loop, and graceful shutdown.

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod shutdown;

pub use bot::run;
pub use commands::register_commands;
pub use config::BotConfig;
pub use error::BotError;
pub use shutdown::ShutdownController;
