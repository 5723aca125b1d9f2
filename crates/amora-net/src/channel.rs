//! Real-time chat channel over a WebSocket.
//!
//! The socket is owned by a dedicated tokio task. The session talks to it
//! through a typed command channel and receives decoded inbound events on a
//! notification channel, the same shape whether the channel is backed by a
//! socket or by an in-memory pair in tests.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use amora_shared::constants::{
    CHANNEL_CAPACITY, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_WS_URL, RECONNECT_BASE_DELAY,
    RECONNECT_MAX_DELAY,
};
use amora_shared::{InboundEvent, OutboundEvent};

use crate::error::ChannelError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Emit an event. Fire and forget: acknowledgements, if any, arrive as
    /// separate inbound events.
    Emit(OutboundEvent),
    /// Close the socket and stop the task.
    Shutdown,
}

/// Notifications sent *from* the channel task to the session.
#[derive(Debug, Clone)]
pub enum ChannelNotification {
    /// A well-formed inbound event.
    Event(InboundEvent),
    /// The socket dropped; a reconnect is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// A new socket replaced the dropped one.
    Reconnected,
    /// The socket is gone for good.
    Disconnected { reason: String },
}

/// Configuration for spawning the channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Sent as a bearer token on the upgrade request.
    pub auth_token: Option<String>,
    /// Reconnect attempts after an established socket drops (0 disables).
    pub reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            auth_token: None,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            reconnect_max_delay: RECONNECT_MAX_DELAY,
        }
    }
}

/// Connect and spawn the channel task.
///
/// The initial connection is attempted exactly once; a failure is returned
/// to the caller. Reconnects only happen after a socket that was up drops.
///
/// # Returns
///
/// `(command_tx, notification_rx)`
pub async fn spawn_channel(
    config: ChannelConfig,
) -> Result<
    (
        mpsc::Sender<ChannelCommand>,
        mpsc::Receiver<ChannelNotification>,
    ),
    ChannelError,
> {
    let stream = connect(&config).await?;
    info!(url = %config.url, "Chat channel connected");

    let (cmd_tx, cmd_rx) = mpsc::channel::<ChannelCommand>(CHANNEL_CAPACITY);
    let (notif_tx, notif_rx) = mpsc::channel::<ChannelNotification>(CHANNEL_CAPACITY);

    tokio::spawn(run_channel(config, stream, cmd_rx, notif_tx));

    Ok((cmd_tx, notif_rx))
}

async fn connect(config: &ChannelConfig) -> Result<WsStream, ChannelError> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(ref token) = config.auth_token {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

enum SocketOutcome {
    Shutdown,
    Dropped(String),
}

enum ReconnectOutcome {
    Reconnected(WsStream),
    GaveUp,
    Shutdown,
}

async fn run_channel(
    config: ChannelConfig,
    stream: WsStream,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
) {
    let mut stream = stream;

    loop {
        match drive_socket(stream, &mut cmd_rx, &notif_tx).await {
            SocketOutcome::Shutdown => break,
            SocketOutcome::Dropped(reason) => {
                warn!(reason = %reason, "Chat channel dropped");
                match reconnect(&config, &mut cmd_rx, &notif_tx).await {
                    ReconnectOutcome::Reconnected(new_stream) => {
                        info!("Chat channel reconnected");
                        stream = new_stream;
                        if notif_tx.send(ChannelNotification::Reconnected).await.is_err() {
                            break;
                        }
                    }
                    ReconnectOutcome::GaveUp => {
                        let _ = notif_tx
                            .send(ChannelNotification::Disconnected { reason })
                            .await;
                        break;
                    }
                    ReconnectOutcome::Shutdown => break,
                }
            }
        }
    }

    info!("Chat channel task terminated");
}

/// Pump one socket until it drops or a shutdown is requested.
async fn drive_socket(
    stream: WsStream,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
) -> SocketOutcome {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            // --- Outgoing commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChannelCommand::Emit(event)) => {
                        let text = match event.to_json() {
                            Ok(t) => t,
                            Err(e) => {
                                error!(event = event.name(), error = %e, "Failed to encode event");
                                continue;
                            }
                        };
                        debug!(event = event.name(), len = text.len(), "Emitting event");
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            return SocketOutcome::Dropped(e.to_string());
                        }
                    }
                    Some(ChannelCommand::Shutdown) | None => {
                        info!("Chat channel shutdown requested");
                        let _ = sink.close().await;
                        return SocketOutcome::Shutdown;
                    }
                }
            }

            // --- Incoming frames ---
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match InboundEvent::from_json(&text) {
                            Ok(event) => {
                                debug!(event = event.name(), "Inbound event");
                                if notif_tx.send(ChannelNotification::Event(event)).await.is_err() {
                                    let _ = sink.close().await;
                                    return SocketOutcome::Shutdown;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SocketOutcome::Dropped(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SocketOutcome::Dropped(e.to_string()),
                    None => return SocketOutcome::Dropped("stream ended".to_string()),
                }
            }
        }
    }
}

async fn reconnect(
    config: &ChannelConfig,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
) -> ReconnectOutcome {
    for attempt in 1..=config.reconnect_attempts {
        let delay = backoff_delay(
            attempt,
            config.reconnect_base_delay,
            config.reconnect_max_delay,
        );
        if notif_tx
            .send(ChannelNotification::Reconnecting { attempt, delay })
            .await
            .is_err()
        {
            return ReconnectOutcome::Shutdown;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Emit(event)) => {
                        warn!(event = event.name(), "Channel down, event not delivered");
                    }
                    Some(ChannelCommand::Shutdown) | None => return ReconnectOutcome::Shutdown,
                },
            }
        }

        match connect(config).await {
            Ok(stream) => return ReconnectOutcome::Reconnected(stream),
            Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }

    ReconnectOutcome::GaveUp
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(5, base, max), Duration::from_secs(16));
        assert_eq!(backoff_delay(6, base, max), Duration::from_secs(30));
        assert_eq!(backoff_delay(40, base, max), Duration::from_secs(30));
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(config.reconnect_attempts, DEFAULT_RECONNECT_ATTEMPTS);
        assert!(config.auth_token.is_none());
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_reported() {
        // Nothing listens on port 9 (discard) on loopback in test environments.
        let config = ChannelConfig {
            url: "ws://127.0.0.1:9/ws".to_string(),
            ..ChannelConfig::default()
        };
        assert!(spawn_channel(config).await.is_err());
    }
}
