//! Acknowledgment sink for trigger originators.

use async_trait::async_trait;

/// Receives the short replies a trigger produces: exactly one immediate
/// acknowledgment, and optionally one deferred follow-up if the DM attempt
/// fails after the acknowledgment was already sent.
///
/// Delivery is best-effort; implementations log failures and swallow them.
#[async_trait]
pub trait AckSink: Send {
    /// The immediate reply to the triggering command.
    async fn reply(&mut self, text: &str);

    /// A deferred follow-up after the immediate reply (DM-failure path).
    async fn follow_up(&mut self, text: &str);
}
