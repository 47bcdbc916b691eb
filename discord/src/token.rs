//! Bot token sanity checks, run before any connection attempt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::DiscordError;

/// Structural check on a bot token: three non-empty dot-separated base64url
/// segments with no surrounding or embedded whitespace.
pub fn check_shape(token: &str) -> Result<(), DiscordError> {
    if token.trim() != token || token.chars().any(char::is_whitespace) {
        return Err(DiscordError::MalformedToken(
            "token contains whitespace".into(),
        ));
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(DiscordError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    }
    for segment in segments {
        let ok = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=');
        if !ok {
            return Err(DiscordError::MalformedToken(
                "segment contains non-base64url characters".into(),
            ));
        }
    }
    Ok(())
}

/// Extract the application id encoded in the token's first segment.
pub fn application_id(token: &str) -> Result<String, DiscordError> {
    check_shape(token)?;
    let first = token.split('.').next().unwrap_or_default();
    let decoded = URL_SAFE_NO_PAD
        .decode(first.trim_end_matches('='))
        .map_err(|e| DiscordError::MalformedToken(format!("first segment: {e}")))?;
    let id = String::from_utf8(decoded)
        .map_err(|_| DiscordError::MalformedToken("first segment is not UTF-8".into()))?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(DiscordError::MalformedToken(
            "first segment does not decode to a numeric id".into(),
        ));
    }
    Ok(id)
}

/// Full pre-connect check: shape plus application-id match.
pub fn check_token(token: &str, expected_application_id: &str) -> Result<(), DiscordError> {
    let embedded = application_id(token)?;
    if embedded != expected_application_id {
        return Err(DiscordError::TokenApplicationMismatch(
            expected_application_id.to_string(),
        ));
    }
    Ok(())
}
