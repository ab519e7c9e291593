//! Process-wide realtime connection manager.
//!
//! At most one realtime connection may exist per process. Rather than a
//! bare mutable global, the connection lives behind this manager so the
//! lifecycle invariant is enforced at one boundary: `connect` is a no-op
//! when a connection is already active, `disconnect` tears it down, and
//! `status` observes it.

use tokio::sync::{mpsc, Mutex};

use super::{ChannelError, ChannelEvent, ConnectionState, NotificationChannel};

/// Owns the single `NotificationChannel` for this process.
#[derive(Debug)]
pub struct RealtimeManager {
    server_url: String,
    channel: Mutex<Option<NotificationChannel>>,
}

impl RealtimeManager {
    /// Create a manager for the given backend. Does not connect.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            channel: Mutex::new(None),
        }
    }

    /// Connect if no connection is active.
    ///
    /// Returns the event receiver for a newly established connection, or
    /// `None` when an active connection was reused (the existing receiver
    /// stays valid). This is the reuse guard: calling twice while connected
    /// performs no second connection attempt.
    pub async fn connect(
        &self,
        auth_token: String,
    ) -> Result<Option<mpsc::Receiver<ChannelEvent>>, ChannelError> {
        let mut guard = self.channel.lock().await;

        if let Some(existing) = guard.as_ref() {
            if existing.shared_state().is_active().await {
                log::debug!("Realtime channel already active, reusing");
                return Ok(None);
            }
        }

        let mut channel = NotificationChannel::new(self.server_url.clone());
        channel.connect(auth_token).await?;
        let receiver = channel.take_event_receiver();
        *guard = Some(channel);
        Ok(receiver)
    }

    /// Tear down the connection (logout / shutdown). No-op when idle.
    pub async fn disconnect(&self) {
        let mut guard = self.channel.lock().await;
        if let Some(mut channel) = guard.take() {
            channel.disconnect().await;
        }
    }

    /// Current connection state.
    pub async fn status(&self) -> ConnectionState {
        let guard = self.channel.lock().await;
        match guard.as_ref() {
            Some(channel) => channel.shared_state().get().await,
            None => ConnectionState::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    /// Accepts connections forever, welcoming any token.
    async fn spawn_accepting_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream)
                        .await
                        .expect("ws accept");
                    let _auth = ws.next().await;
                    ws.send(Message::Text(r#"{"type":"welcome"}"#.to_string()))
                        .await
                        .expect("welcome");
                    while ws.next().await.is_some() {}
                });
            }
        });

        format!("http://{}", addr)
    }

    async fn wait_connected(manager: &RealtimeManager) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if manager.status().await == ConnectionState::Connected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("never connected");
    }

    #[tokio::test]
    async fn test_second_connect_reuses_active_connection() {
        let url = spawn_accepting_server().await;
        let manager = RealtimeManager::new(url);

        let first = manager
            .connect("clt_tok".to_string())
            .await
            .expect("connect");
        assert!(first.is_some(), "fresh connection yields a receiver");
        wait_connected(&manager).await;

        let second = manager
            .connect("clt_tok".to_string())
            .await
            .expect("connect");
        assert!(second.is_none(), "active connection must be reused");

        manager.disconnect().await;
        assert_eq!(manager.status().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let url = spawn_accepting_server().await;
        let manager = RealtimeManager::new(url);

        manager
            .connect("clt_tok".to_string())
            .await
            .expect("connect");
        wait_connected(&manager).await;
        manager.disconnect().await;

        let again = manager
            .connect("clt_tok".to_string())
            .await
            .expect("reconnect");
        assert!(again.is_some(), "fresh connection after teardown");
        wait_connected(&manager).await;
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_status_idle_without_channel() {
        let manager = RealtimeManager::new("http://127.0.0.1:9");
        assert_eq!(manager.status().await, ConnectionState::Disconnected);
        // Disconnect on an idle manager is a no-op
        manager.disconnect().await;
    }
}
