//! Rolegate daemon — entry point for running the verification bot.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rolegate_bot::{BotConfig, ShutdownController};
use rolegate_discord::{token, DiscordRest};
use rolegate_types::{ChannelId, GuildId, RoleId};
use rolegate_utils::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "rolegate", about = "Discord role-verification bot")]
struct Cli {
    /// Bot token. Prefer the environment variable over the flag so the
    /// token stays out of shell history.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Application (client) id the token must belong to.
    #[arg(long, env = "DISCORD_APPLICATION_ID")]
    application_id: Option<String>,

    /// Guild the bot operates in.
    #[arg(long, env = "DISCORD_GUILD_ID")]
    guild_id: Option<u64>,

    /// Role granted on successful verification.
    #[arg(long, env = "DISCORD_ROLE_ID")]
    role_id: Option<u64>,

    /// The shared verification code.
    #[arg(long, env = "VERIFY_CODE", hide_env_values = true)]
    verify_code: Option<String>,

    /// Channel the verify commands are restricted to.
    #[arg(long, env = "VERIFY_CHANNEL_ID")]
    verify_channel_id: Option<u64>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ROLEGATE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROLEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings are
    /// used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Connect to Discord and serve verification sessions.
    Run,
    /// Register the guild slash commands, then exit.
    RegisterCommands,
}

/// File config as the base, CLI/env values on top.
fn resolve_config(cli: &Cli) -> anyhow::Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("config path is not valid UTF-8"))?;
            let config = BotConfig::from_toml_file(path)?;
            tracing::info!(path, "loaded config file");
            config
        }
        None => BotConfig {
            token: String::new(),
            application_id: String::new(),
            guild_id: GuildId::new(0),
            role_id: RoleId::new(0),
            verify_code: String::new(),
            verify_channel_id: None,
            verify: Default::default(),
            log_format: "human".to_string(),
            log_level: "info".to_string(),
        },
    };

    if let Some(token) = &cli.token {
        config.token = token.clone();
    }
    if let Some(application_id) = &cli.application_id {
        config.application_id = application_id.clone();
    }
    if let Some(guild_id) = cli.guild_id {
        config.guild_id = GuildId::new(guild_id);
    }
    if let Some(role_id) = cli.role_id {
        config.role_id = RoleId::new(role_id);
    }
    if let Some(verify_code) = &cli.verify_code {
        config.verify_code = verify_code.clone();
    }
    if let Some(channel) = cli.verify_channel_id {
        config.verify_channel_id = Some(ChannelId::new(channel));
    }
    if let Some(log_format) = &cli.log_format {
        config.log_format = log_format.clone();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging defaults apply until the config is resolved; resolve_config
    // logs nothing above info.
    let (format, level) = (
        cli.log_format.as_deref().unwrap_or("human"),
        cli.log_level.as_deref().unwrap_or("info"),
    );
    init_logging(LogFormat::from_config(format), level);

    let config = resolve_config(&cli)?;
    token::check_token(&config.token, &config.application_id)?;

    match cli.command {
        Command::Run => {
            tracing::info!(
                guild = %config.guild_id,
                role = %config.role_id,
                verify_channel = ?config.verify_channel_id,
                "starting rolegate"
            );

            let shutdown = Arc::new(ShutdownController::new());
            let signal_controller = Arc::clone(&shutdown);
            tokio::spawn(async move {
                signal_controller.wait_for_signal().await;
            });

            rolegate_bot::run(config, &shutdown).await?;
            tracing::info!("rolegate exited cleanly");
        }
        Command::RegisterCommands => {
            let rest = DiscordRest::new(&config.token);
            rolegate_bot::register_commands(&rest, &config.application_id, config.guild_id)
                .await?;
            tracing::info!(guild = %config.guild_id, "slash commands registered");
        }
    }

    Ok(())
}
