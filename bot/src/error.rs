use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Discord(#[from] rolegate_discord::DiscordError),

    #[error("gateway closed before READY")]
    NoReady,
}
