//! WebSocket implementation of the session channel
//!
//! # Connection flow
//!
//! 1. `connect()` - establish the WebSocket (with retries)
//! 2. A writer task drains one ordered outbound queue to the socket
//! 3. A reader task parses inbound events and fans them out
//! 4. On a dropped connection, every subscriber observes `ConnectionLost`
//!
//! # Retry strategy
//!
//! The initial connection retries 3 times with exponential backoff
//! (1s, 2s, 4s). A mid-session drop does NOT reconnect: the session is
//! aborted and the user must explicitly restart capture.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, Message},
};

use super::{ChannelError, ClientEvent, ControlEvent, ServerEvent, SessionChannel, TransportFrame};

/// Connection timeout for the initial WebSocket handshake
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum attempts for the initial connection
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the inbound fan-out; slow subscribers see `Lagged`, they
/// never stall the reader.
const EVENT_FANOUT_CAPACITY: usize = 256;

/// Persistent WebSocket channel to the transcription endpoint.
pub struct SocketChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    events: broadcast::Sender<ServerEvent>,
    writer_task: tokio::task::JoinHandle<()>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl SocketChannel {
    /// Connect to the streaming endpoint, retrying with exponential
    /// backoff.
    pub async fn connect(endpoint: &str) -> Result<Self, ChannelError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                log::info!(
                    "Retrying connection in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
            }

            match Self::try_connect(endpoint).await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    log::warn!("Connection attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChannelError::ConnectionFailed("max retries exceeded".to_string())))
    }

    /// Single connection attempt (no retries).
    async fn try_connect(endpoint: &str) -> Result<Self, ChannelError> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        log::info!("Connecting to streaming endpoint {}...", endpoint);

        let (ws_stream, _response) = timeout(
            CONNECTION_TIMEOUT,
            connect_async_with_config(
                request, None, false, // disable_nagle (we want low latency)
            ),
        )
        .await
        .map_err(|_| ChannelError::ConnectionFailed("connection timeout".to_string()))?
        .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        log::info!("Streaming endpoint connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (events, _) = broadcast::channel(EVENT_FANOUT_CAPACITY);

        // Writer task: one ordered queue, control and data interleaved in
        // submission order, so session.stop always lands after the frames
        // sent before it.
        let writer_events = events.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        log::warn!("Dropping unencodable outbound event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json)).await {
                    log::warn!("Outbound send failed: {}", e);
                    let _ = writer_events.send(ServerEvent::ConnectionLost);
                    break;
                }
            }
            let _ = write.close().await;
            log::debug!("Writer task exiting");
        });

        // Reader task: parse server events and fan them out.
        let reader_events = events.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            let _ = reader_events.send(event);
                        }
                        Err(e) => {
                            log::warn!("Failed to parse server event: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        log::info!("Connection closed by server");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Connection error: {}", e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            let _ = reader_events.send(ServerEvent::ConnectionLost);
            log::debug!("Reader task exiting");
        });

        let _ = events.send(ServerEvent::Connected);

        Ok(Self {
            outbound,
            events,
            writer_task,
            reader_task,
        })
    }

    /// Tear the connection down. Queued outbound events are dropped.
    pub fn disconnect(&self) {
        log::info!("Disconnecting from streaming endpoint");
        self.reader_task.abort();
        self.writer_task.abort();
    }

    fn queue(&self, event: ClientEvent) -> Result<(), ChannelError> {
        self.outbound
            .send(event)
            .map_err(|_| ChannelError::ConnectionLost)
    }
}

impl SessionChannel for SocketChannel {
    fn send_control(&self, event: ControlEvent) -> Result<(), ChannelError> {
        self.queue(event.into())
    }

    fn send_data(&self, frame: TransportFrame) -> Result<(), ChannelError> {
        self.queue(ClientEvent::Frame { samples: frame })
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_invalid_endpoint_fails() {
        // An unparseable URL fails the single attempt immediately, without
        // waiting out the retry schedule.
        let result = SocketChannel::try_connect("not a url").await;
        assert!(matches!(result, Err(ChannelError::ConnectionFailed(_))));
    }
}
