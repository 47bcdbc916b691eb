//! Bot wiring: gateway connection, event loop, session manager.

use std::sync::Arc;

use rolegate_discord::wire::Ready;
use rolegate_discord::{
    token, DiscordDmChannel, DiscordRest, DiscordRoleGateway, GatewayClient, GatewayEvent,
    MessageRouter,
};
use rolegate_session::{SecretCode, SessionManager};
use rolegate_types::{DmChannel, RoleGateway};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::commands::CommandHandler;
use crate::config::BotConfig;
use crate::error::BotError;
use crate::shutdown::ShutdownController;

/// Queue depth between the gateway read loop and the event loop.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Connect to Discord and run until shutdown.
///
/// The gateway runs as its own task; this function owns the event loop.
/// Session state is built after the first READY, which carries the bot's
/// own user id (needed for the permission check).
pub async fn run(config: BotConfig, shutdown: &ShutdownController) -> Result<(), BotError> {
    config.validate()?;
    token::check_token(&config.token, &config.application_id)?;

    let rest = Arc::new(DiscordRest::new(&config.token));
    let router = Arc::new(MessageRouter::new());

    let (events_tx, mut events) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let gateway = GatewayClient::new(&config.token, events_tx);
    let gateway_shutdown = shutdown.subscribe();
    let gateway_task = tokio::spawn(async move { gateway.run(gateway_shutdown).await });

    let mut loop_shutdown = shutdown.subscribe();
    let ready = match wait_for_ready(&mut events, &mut loop_shutdown).await? {
        Some(ready) => ready,
        None => {
            let _ = gateway_task.await;
            return Ok(());
        }
    };
    info!(user = %ready.user.id, session = %ready.session_id, "gateway READY");

    let role_gateway: Arc<dyn RoleGateway> = Arc::new(DiscordRoleGateway::new(
        Arc::clone(&rest),
        config.guild_id,
        config.role_id,
        ready.user.id,
    ));
    let dm_channel: Arc<dyn DmChannel> =
        Arc::new(DiscordDmChannel::new(Arc::clone(&rest), Arc::clone(&router)));
    let manager = SessionManager::new(
        role_gateway,
        dm_channel,
        SecretCode::new(&config.verify_code),
        config.verify.clone(),
    );
    let handler = CommandHandler::new(
        manager,
        Arc::clone(&rest),
        Arc::clone(&router),
        &config,
        ready.user.id,
    );

    loop {
        tokio::select! {
            _ = loop_shutdown.recv() => break,
            event = events.recv() => match event {
                Some(GatewayEvent::Ready(ready)) => {
                    info!(user = %ready.user.id, "gateway reconnected");
                }
                Some(GatewayEvent::MessageCreate(message)) => {
                    handler.handle_message(message).await;
                }
                Some(GatewayEvent::InteractionCreate(interaction)) => {
                    handler.handle_interaction(interaction).await;
                }
                None => break,
            }
        }
    }

    let _ = gateway_task.await;
    Ok(())
}

/// Drain events until the first READY.
///
/// Returns `Ok(None)` when shutdown arrives first; an event channel that
/// closes before READY means the gateway never got a session up.
async fn wait_for_ready(
    events: &mut mpsc::Receiver<GatewayEvent>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<Option<Ready>, BotError> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(None),
            event = events.recv() => match event {
                Some(GatewayEvent::Ready(ready)) => return Ok(Some(ready)),
                Some(_) => continue,
                None => return Err(BotError::NoReady),
            }
        }
    }
}
