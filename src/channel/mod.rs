//! Session channel to the remote transcription endpoint
//!
//! One persistent, bidirectional, ordered event channel per process,
//! established independently of capture sessions and reused across
//! start/stop cycles. Outbound sends are non-blocking queue submissions;
//! inbound events fan out to whoever subscribed. The channel never waits
//! for a specific reply to a specific send.

pub mod protocol;
mod socket;

pub use protocol::{
    encode, ClientEvent, ControlEvent, LanguageCode, ServerEvent, TransportFrame,
};
pub use socket::SocketChannel;

use tokio::sync::broadcast;

/// Per-session ordering contract: every `send_data` submitted between a
/// `SessionStart` and its matching `SessionStop` reaches the remote in
/// submission order, and the stop is observed only after all prior frames.
pub trait SessionChannel: Send + Sync {
    /// Queue a control event. Non-blocking.
    fn send_control(&self, event: ControlEvent) -> Result<(), ChannelError>;

    /// Queue one encoded frame. Non-blocking.
    fn send_data(&self, frame: TransportFrame) -> Result<(), ChannelError>;

    /// Subscribe to inbound remote events and connection lifecycle
    /// notices. Every subscriber observes `ConnectionLost` when the
    /// underlying connection drops.
    fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;
}

/// Errors that can occur on the session channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// The connection dropped; the in-flight session is aborted and the
    /// user must restart capture. Frames already sent are not resent.
    ConnectionLost,
    /// A message could not be encoded for the wire.
    ProtocolError(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to the streaming endpoint: {}", e)
            }
            ChannelError::ConnectionLost => write!(f, "Connection to the streaming endpoint lost"),
            ChannelError::ProtocolError(e) => write!(f, "Channel protocol error: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_error_display() {
        let err = ChannelError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));

        let err = ChannelError::ConnectionLost;
        assert!(err.to_string().contains("lost"));
    }
}
