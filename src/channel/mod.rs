//! Realtime channel for server-to-client push events.
//!
//! A single persistent WebSocket connection to the Classline backend used
//! to receive push-style events while the app is foregrounded.
//!
//! # Architecture
//!
//! ```text
//! RealtimeManager (process-wide singleton guard)
//!     └── NotificationChannel
//!         ├── WebSocket connection (tokio-tungstenite)
//!         ├── Auth handshake (token frame, welcome/unauthorized reply)
//!         ├── Bounded reconnection (exponential backoff + jitter)
//!         └── Stale-connection health check
//! ```
//!
//! Delivery is at-most-once best-effort while connected; gaps are repaired
//! by the next explicit HTTP fetch. There is no custom framing or ordering
//! beyond the JSON event frames below.

pub mod manager;
pub mod socket;

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::Notification;

/// Connection state for the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Attempting the first connection.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Reconnecting after transient loss.
    Reconnecting {
        /// Current reconnection attempt number.
        attempt: u32,
        /// Milliseconds until the next retry.
        next_retry_ms: u64,
    },
}

/// Events pushed by the server over the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A new notification was created for this user.
    NewNotification(Notification),
    /// Acknowledgment that a notification was marked read (no state change
    /// beyond what the originating request already applied).
    NotificationMarkedRead {
        /// Server id of the acknowledged notification.
        id: i64,
    },
}

/// A frame received from the server.
///
/// Control frames carry `type` (welcome/unauthorized/ping); data frames
/// carry `event` plus the event payload fields.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerFrame {
    #[serde(rename = "type")]
    pub frame_type: Option<String>,
    pub event: Option<String>,
    pub notification: Option<Notification>,
    pub id: Option<i64>,
}

/// Errors that can occur during channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// Failed to establish the connection.
    ConnectionFailed(String),
    /// Server rejected the auth token at handshake.
    AuthRejected,
    /// A connection already exists; at most one per process.
    AlreadyConnected,
    /// Operation timed out.
    Timeout,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::AuthRejected => write!(f, "Server rejected the auth token"),
            Self::AlreadyConnected => write!(f, "Realtime channel already connected"),
            Self::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Shared connection state observable from outside the channel.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub async fn get(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Set the state.
    pub async fn set(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    /// Check if any connection activity is in progress (anything but
    /// `Disconnected`).
    pub async fn is_active(&self) -> bool {
        !matches!(*self.state.read().await, ConnectionState::Disconnected)
    }
}

// Re-exports
pub use manager::RealtimeManager;
pub use socket::NotificationChannel;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_state_transitions() {
        let state = SharedConnectionState::new();
        assert_eq!(state.get().await, ConnectionState::Disconnected);
        assert!(!state.is_active().await);

        state.set(ConnectionState::Connecting).await;
        assert!(state.is_active().await);
        assert!(!state.is_connected().await);

        state.set(ConnectionState::Connected).await;
        assert!(state.is_connected().await);

        state
            .set(ConnectionState::Reconnecting {
                attempt: 2,
                next_retry_ms: 1500,
            })
            .await;
        assert!(state.is_active().await);
        assert!(!state.is_connected().await);
    }

    #[test]
    fn test_server_frame_parsing() {
        let frame: ServerFrame = serde_json::from_str(r#"{"type":"welcome"}"#).unwrap();
        assert_eq!(frame.frame_type.as_deref(), Some("welcome"));
        assert!(frame.event.is_none());

        let frame: ServerFrame = serde_json::from_str(
            r#"{"event":"notification_marked_read","id":42}"#,
        )
        .unwrap();
        assert_eq!(frame.event.as_deref(), Some("notification_marked_read"));
        assert_eq!(frame.id, Some(42));
    }

    #[test]
    fn test_channel_error_display() {
        assert!(ChannelError::AuthRejected.to_string().contains("rejected"));
        assert!(ChannelError::AlreadyConnected
            .to_string()
            .contains("already connected"));
        assert!(ChannelError::ConnectionFailed("refused".into())
            .to_string()
            .contains("refused"));
    }
}
