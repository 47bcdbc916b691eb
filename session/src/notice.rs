//! User-facing notice text.
//!
//! Everything the bot says in one place. None of these strings may ever
//! contain the configured verification code.

use rolegate_utils::format_duration;

/// Immediate acknowledgment after a trigger starts a session.
pub const CHECK_DMS: &str = "📩 Check your DMs!";

/// Informational notice for a user who already holds the role.
pub const ALREADY_PRIVILEGED: &str = "ℹ️ You already have the role — no need to verify again.";

/// Notice when another session is already running for the user.
pub const ALREADY_IN_PROGRESS: &str =
    "⚠️ A verification session is already in progress — check your DMs.";

/// Wrong code, attempts remain.
pub const WRONG_CODE: &str = "❌ Wrong code, try again.";

/// Matched, but the user has not passed membership screening.
pub const PENDING_SCREENING: &str =
    "⚠️ You need to accept the server rules / screening first, then run /verify or !verify again.";

/// Granted and confirmed.
pub const GRANTED: &str = "✅ Verification successful! The role has been granted.";

/// Grant reported success but the re-read denied it.
pub const GRANT_NOT_EFFECTIVE: &str =
    "❌ Granting the role did not take effect. Check the bot's Manage Roles permission and role order.";

/// Deadline fired before a match.
pub const TIMED_OUT: &str = "⌛ Time is up — run /verify or !verify in the server to try again.";

/// Attempt budget consumed before a match.
pub const ATTEMPTS_EXHAUSTED: &str =
    "⌛ Out of attempts — run /verify or !verify in the server to try again.";

/// Deferred follow-up when the DM could not be opened.
pub const CANNOT_OPEN_DM: &str =
    "❗ Could not start a DM. Check that \"Allow DMs from server members\" is enabled.";

/// The DM prompt asking for the code.
pub fn prompt(window_secs: u64) -> String {
    format!(
        "Enter your verification code (you have {}):",
        format_duration(window_secs)
    )
}

/// Gateway failure while granting; `diagnostic` is user-safe.
pub fn grant_error(diagnostic: &str) -> String {
    format!("❌ Error while granting the role: `{diagnostic}`. Check Manage Roles / role order / screening.")
}

/// Trigger rejected before any session was created.
pub fn trigger_rejected(reason: &str) -> String {
    format!("❗ Cannot start verification: {reason}.")
}
