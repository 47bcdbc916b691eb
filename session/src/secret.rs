//! Shared-secret comparison.

use std::fmt;

/// The configured verification code and its comparison policy.
///
/// Comparison is case-insensitive and whitespace-trimmed: the code is
/// normalized once at construction, candidates on every comparison.
/// Immutable for the process lifetime.
#[derive(Clone)]
pub struct SecretCode(String);

impl SecretCode {
    pub fn new(raw: &str) -> Self {
        Self(normalize(raw))
    }

    /// Whether a candidate string matches the configured code.
    pub fn matches(&self, candidate: &str) -> bool {
        normalize(candidate) == self.0
    }
}

// The code must never reach logs or error text.
impl fmt::Debug for SecretCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretCode(<redacted>)")
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
