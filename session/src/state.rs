//! Session state tracking.

/// The lifecycle state of one verification session.
///
/// `Granted`, `GrantFailed`, `Expired`, `AlreadyPrivileged` and `Blocked`
/// are terminal: once reached, no further transition occurs and the
/// session's resources (inbound subscription, deadline timer) are released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Session object exists; guards not yet evaluated.
    Created,
    /// DM opened, prompt being sent.
    Prompting,
    /// Prompt delivered; collecting candidate codes until match, deadline,
    /// or attempt exhaustion.
    AwaitingResponse,
    /// Code matched; grant in flight.
    Verifying,
    /// Role granted and confirmed by re-read.
    Granted,
    /// Code matched but the grant could not be completed.
    GrantFailed,
    /// Deadline fired or attempts exhausted before a match.
    Expired,
    /// User already held the role at session start; nothing to do.
    AlreadyPrivileged,
    /// The grantor cannot confer the role (permission / role order).
    Blocked,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Granted
                | Self::GrantFailed
                | Self::Expired
                | Self::AlreadyPrivileged
                | Self::Blocked
        )
    }
}

/// Why a session expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The deadline fired before a match.
    Timeout,
    /// The attempt budget or inbound cap was consumed without a match.
    AttemptsExhausted,
}

/// Why a matched code still did not produce a grant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrantFailure {
    /// The user has not passed membership screening; the grant would not
    /// take effect. Recoverable: the user may retrigger after screening.
    PendingScreening,
    /// The grant call reported success but a re-read of the user's roles
    /// denied it. Never treated as success.
    GrantNotEffective,
    /// The gateway failed outright; the diagnostic is user-safe.
    Gateway(String),
}

/// The terminal result of a driven session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Granted,
    GrantFailed(GrantFailure),
    Expired(ExpiryReason),
    /// The initial DM could not be opened or the prompt could not be sent;
    /// the session ended before collecting any input.
    CannotOpenChannel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_exactly_the_five() {
        let terminal = [
            SessionState::Granted,
            SessionState::GrantFailed,
            SessionState::Expired,
            SessionState::AlreadyPrivileged,
            SessionState::Blocked,
        ];
        let live = [
            SessionState::Created,
            SessionState::Prompting,
            SessionState::AwaitingResponse,
            SessionState::Verifying,
        ];
        for s in terminal {
            assert!(s.is_terminal(), "{s:?} should be terminal");
        }
        for s in live {
            assert!(!s.is_terminal(), "{s:?} should not be terminal");
        }
    }
}
