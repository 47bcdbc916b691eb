//! Minimal Discord gateway client.
//!
//! Speaks just enough of the gateway protocol to keep a session alive and
//! surface the three dispatch events the bot consumes: READY,
//! MESSAGE_CREATE and INTERACTION_CREATE. Everything else is acknowledged
//! and dropped.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::DiscordError;
use crate::wire::{
    intent, op, GatewayFrame, Hello, InteractionCreate, MessageCreate, Ready, GATEWAY_URL,
};

/// Floor and ceiling for the reconnect backoff.
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dispatch events surfaced to the bot layer.
#[derive(Debug)]
pub enum GatewayEvent {
    Ready(Ready),
    MessageCreate(MessageCreate),
    InteractionCreate(InteractionCreate),
}

/// Why a gateway session ended without an error.
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Long-running gateway connection with automatic reconnect.
pub struct GatewayClient {
    url: String,
    token: String,
    events: mpsc::Sender<GatewayEvent>,
}

impl GatewayClient {
    pub fn new(token: &str, events: mpsc::Sender<GatewayEvent>) -> Self {
        Self {
            url: GATEWAY_URL.to_string(),
            token: token.to_string(),
            events,
        }
    }

    /// Connect and keep reconnecting until shutdown is signalled.
    ///
    /// The backoff doubles on each failed session and resets once a session
    /// delivers its HELLO.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = BACKOFF_MIN;
        loop {
            match self.run_session(&mut shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("gateway shut down");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("gateway session ended, reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, delay_secs = backoff.as_secs(), "gateway session failed");
                }
            }
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                _ = shutdown.recv() => return,
            }
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }

    async fn run_session(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        backoff: &mut Duration,
    ) -> Result<SessionEnd, DiscordError> {
        let (mut stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| DiscordError::GatewayConnect(e.to_string()))?;

        let hello = self.expect_hello(&mut stream).await?;
        *backoff = BACKOFF_MIN;
        debug!(heartbeat_ms = hello.heartbeat_interval, "gateway HELLO");

        self.send_identify(&mut stream).await?;

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        // First tick fires immediately; skip it so the first beat waits a
        // full interval after IDENTIFY.
        heartbeat.tick().await;

        let mut last_seq: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = stream.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        warn!("heartbeat not acknowledged, dropping session");
                        return Ok(SessionEnd::Reconnect);
                    }
                    acked = false;
                    self.send_heartbeat(&mut stream, last_seq).await?;
                }
                next = stream.next() => {
                    let message = match next {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            return Err(DiscordError::GatewayConnect(e.to_string()));
                        }
                        None => return Ok(SessionEnd::Reconnect),
                    };
                    let text = match message {
                        WsMessage::Text(text) => text,
                        WsMessage::Close(frame) => {
                            debug!(?frame, "gateway closed the connection");
                            return Ok(SessionEnd::Reconnect);
                        }
                        WsMessage::Ping(payload) => {
                            stream
                                .send(WsMessage::Pong(payload))
                                .await
                                .map_err(|e| DiscordError::GatewayConnect(e.to_string()))?;
                            continue;
                        }
                        _ => continue,
                    };
                    let frame: GatewayFrame = serde_json::from_str(&text)
                        .map_err(|e| DiscordError::GatewayProtocol(e.to_string()))?;
                    match frame.op {
                        op::DISPATCH => {
                            if frame.s.is_some() {
                                last_seq = frame.s;
                            }
                            self.dispatch(frame).await;
                        }
                        op::HEARTBEAT => {
                            self.send_heartbeat(&mut stream, last_seq).await?;
                        }
                        op::HEARTBEAT_ACK => {
                            acked = true;
                        }
                        op::RECONNECT => {
                            return Ok(SessionEnd::Reconnect);
                        }
                        other => {
                            debug!(op = other, "ignoring gateway opcode");
                        }
                    }
                }
            }
        }
    }

    async fn expect_hello(&self, stream: &mut WsStream) -> Result<Hello, DiscordError> {
        let message = stream
            .next()
            .await
            .ok_or_else(|| DiscordError::GatewayProtocol("closed before HELLO".into()))?
            .map_err(|e| DiscordError::GatewayConnect(e.to_string()))?;
        let text = match message {
            WsMessage::Text(text) => text,
            other => {
                return Err(DiscordError::GatewayProtocol(format!(
                    "expected HELLO, got {other:?}"
                )));
            }
        };
        let frame: GatewayFrame = serde_json::from_str(&text)
            .map_err(|e| DiscordError::GatewayProtocol(e.to_string()))?;
        if frame.op != op::HELLO {
            return Err(DiscordError::GatewayProtocol(format!(
                "expected HELLO, got opcode {}",
                frame.op
            )));
        }
        serde_json::from_value(frame.d).map_err(|e| DiscordError::GatewayProtocol(e.to_string()))
    }

    async fn send_identify(&self, stream: &mut WsStream) -> Result<(), DiscordError> {
        let identify = json!({
            "op": op::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": intent::ALL,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "rolegate",
                    "device": "rolegate",
                },
            },
        });
        stream
            .send(WsMessage::Text(identify.to_string().into()))
            .await
            .map_err(|e| DiscordError::GatewayConnect(e.to_string()))
    }

    async fn send_heartbeat(
        &self,
        stream: &mut WsStream,
        last_seq: Option<u64>,
    ) -> Result<(), DiscordError> {
        let beat = json!({ "op": op::HEARTBEAT, "d": last_seq });
        stream
            .send(WsMessage::Text(beat.to_string().into()))
            .await
            .map_err(|e| DiscordError::GatewayConnect(e.to_string()))
    }

    async fn dispatch(&self, frame: GatewayFrame) {
        let event = match frame.t.as_deref() {
            Some("READY") => match serde_json::from_value::<Ready>(frame.d) {
                Ok(ready) => GatewayEvent::Ready(ready),
                Err(e) => {
                    warn!(error = %e, "undecodable READY payload");
                    return;
                }
            },
            Some("MESSAGE_CREATE") => match serde_json::from_value::<MessageCreate>(frame.d) {
                Ok(message) => GatewayEvent::MessageCreate(message),
                Err(e) => {
                    warn!(error = %e, "undecodable MESSAGE_CREATE payload");
                    return;
                }
            },
            Some("INTERACTION_CREATE") => {
                match serde_json::from_value::<InteractionCreate>(frame.d) {
                    Ok(interaction) => GatewayEvent::InteractionCreate(interaction),
                    Err(e) => {
                        warn!(error = %e, "undecodable INTERACTION_CREATE payload");
                        return;
                    }
                }
            }
            Some(other) => {
                debug!(event = other, "ignoring dispatch event");
                return;
            }
            None => return,
        };
        if self.events.send(event).await.is_err() {
            debug!("event consumer gone, dropping dispatch");
        }
    }
}
