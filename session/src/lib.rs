//! Verification session core.
//!
//! A session is a bounded-time, bounded-attempt challenge/response state
//! machine: the bot DMs a prompt, the user proves possession of the shared
//! verification code, and on success the configured role is granted. The
//! [`SessionManager`] enforces at-most-one live session per user and routes
//! trigger events to session creation.
//!
//! The core is platform-agnostic: it consumes the `RoleGateway`, `DmChannel`
//! and `AckSink` contracts from `rolegate-types` and never talks to Discord
//! directly.

pub mod error;
pub mod manager;
pub mod notice;
pub mod secret;
pub mod session;
pub mod state;

pub use error::SessionError;
pub use manager::{SessionManager, TriggerOutcome};
pub use secret::SecretCode;
pub use session::VerificationSession;
pub use state::{ExpiryReason, GrantFailure, SessionOutcome, SessionState};
