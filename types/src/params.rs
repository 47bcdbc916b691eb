//! Verification session parameters.

use serde::{Deserialize, Serialize};

/// Tunable parameters for a verification session.
///
/// Defaults match the reference deployment: a 180-second response window,
/// three code attempts, and at most three accepted inbound messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyParams {
    /// Response window in seconds, measured from the moment the prompt is
    /// sent. A hard deadline — no extension on partial input.
    #[serde(default = "default_response_window_secs")]
    pub response_window_secs: u64,

    /// Number of wrong-code attempts before the session ends.
    #[serde(default = "default_attempt_budget")]
    pub attempt_budget: u32,

    /// Cap on accepted inbound messages, independent of the deadline.
    #[serde(default = "default_max_inbound")]
    pub max_inbound: u32,
}

fn default_response_window_secs() -> u64 {
    180
}

fn default_attempt_budget() -> u32 {
    3
}

fn default_max_inbound() -> u32 {
    3
}

impl Default for VerifyParams {
    fn default() -> Self {
        Self {
            response_window_secs: default_response_window_secs(),
            attempt_budget: default_attempt_budget(),
            max_inbound: default_max_inbound(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let params = VerifyParams::default();
        assert_eq!(params.response_window_secs, 180);
        assert_eq!(params.attempt_budget, 3);
        assert_eq!(params.max_inbound, 3);
    }
}
