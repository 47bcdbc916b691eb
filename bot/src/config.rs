//! Bot configuration with TOML file support.

use std::fmt;

use rolegate_types::{ChannelId, GuildId, RoleId, VerifyParams};
use serde::{Deserialize, Serialize};

use crate::BotError;

/// Configuration for a Rolegate bot.
///
/// Can be loaded from a TOML file via [`BotConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Snowflake ids are written as
/// strings, matching their wire representation.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot token. Never logged.
    pub token: String,

    /// Application (client) id the token must belong to.
    pub application_id: String,

    /// Guild the bot operates in.
    pub guild_id: GuildId,

    /// Role granted on successful verification.
    pub role_id: RoleId,

    /// The shared verification code. Never logged.
    pub verify_code: String,

    /// Channel the verify commands are restricted to. When unset, commands
    /// work anywhere in the guild and no cleanup happens.
    #[serde(default)]
    pub verify_channel_id: Option<ChannelId>,

    /// Session tuning (response window, attempt budget, inbound cap).
    #[serde(default)]
    pub verify: VerifyParams,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, BotError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BotError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, BotError> {
        toml::from_str(s).map_err(|e| BotError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("BotConfig is always serializable to TOML")
    }

    /// Structural checks that do not need the network.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.token.trim().is_empty() {
            return Err(BotError::Config("token is empty".into()));
        }
        if self.application_id.is_empty()
            || !self.application_id.chars().all(|c| c.is_ascii_digit())
        {
            return Err(BotError::Config("application_id must be numeric".into()));
        }
        if self.guild_id.as_u64() == 0 {
            return Err(BotError::Config("guild_id is not set".into()));
        }
        if self.role_id.as_u64() == 0 {
            return Err(BotError::Config("role_id is not set".into()));
        }
        if self.verify_code.trim().is_empty() {
            return Err(BotError::Config("verify_code is empty".into()));
        }
        Ok(())
    }
}

// Manual Debug: the token and the verification code must never reach logs.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("application_id", &self.application_id)
            .field("guild_id", &self.guild_id)
            .field("role_id", &self.role_id)
            .field("verify_code", &"<redacted>")
            .field("verify_channel_id", &self.verify_channel_id)
            .field("verify", &self.verify)
            .field("log_format", &self.log_format)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        token = "abc.def.ghi"
        application_id = "42"
        guild_id = "100"
        role_id = "300"
        verify_code = "Code123"
    "#;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = BotConfig::from_toml_str(MINIMAL).expect("should parse");
        assert_eq!(config.guild_id, GuildId::new(100));
        assert_eq!(config.verify_channel_id, None);
        assert_eq!(config.verify.response_window_secs, 180);
        assert_eq!(config.verify.attempt_budget, 3);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = BotConfig::from_toml_str(MINIMAL).expect("should parse");
        let toml_str = config.to_toml_string();
        let parsed = BotConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.role_id, config.role_id);
        assert_eq!(parsed.verify_code, config.verify_code);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = format!(
            "{MINIMAL}\nverify_channel_id = \"555\"\n[verify]\nresponse_window_secs = 60\n"
        );
        let config = BotConfig::from_toml_str(&toml).expect("should parse");
        assert_eq!(config.verify_channel_id, Some(ChannelId::new(555)));
        assert_eq!(config.verify.response_window_secs, 60);
        assert_eq!(config.verify.attempt_budget, 3); // default
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let result = BotConfig::from_toml_str("token = \"abc.def.ghi\"");
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rolegate.toml");
        std::fs::write(&path, MINIMAL).expect("write config");
        let config =
            BotConfig::from_toml_file(path.to_str().expect("utf-8 path")).expect("should parse");
        assert_eq!(config.application_id, "42");
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = BotConfig::from_toml_file("/nonexistent/rolegate.toml");
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn debug_never_shows_token_or_code() {
        let config = BotConfig::from_toml_str(MINIMAL).expect("should parse");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("abc.def.ghi"));
        assert!(!rendered.contains("Code123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn validation_rejects_blank_secret() {
        let toml = MINIMAL.replace("\"Code123\"", "\"  \"");
        let config = BotConfig::from_toml_str(&toml).expect("should parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_numeric_application_id() {
        let toml = MINIMAL.replace("\"42\"", "\"not-numeric\"");
        let config = BotConfig::from_toml_str(&toml).expect("should parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        let config = BotConfig::from_toml_str(MINIMAL).expect("should parse");
        assert!(config.validate().is_ok());
    }
}
