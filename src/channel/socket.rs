//! WebSocket channel implementation.
//!
//! `NotificationChannel` owns the persistent connection to the backend's
//! `/ws` endpoint. The auth token is presented in the first frame after the
//! WebSocket handshake; the server answers `welcome` or `unauthorized`.
//! Events then arrive as JSON frames and are forwarded to the consumer
//! through an mpsc queue.
//!
//! # Reconnection
//!
//! Transient failures trigger exponential backoff with jitter, bounded by
//! `MAX_RECONNECT_ATTEMPTS`; once exhausted the channel parks itself in
//! `Disconnected` until `connect` is called again. An `unauthorized` reply
//! triggers exactly one token re-read from the credential store; a second
//! rejection also parks the channel.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};

use crate::constants::{
    CONNECTION_STALE_TIMEOUT_SECS, HEALTH_CHECK_INTERVAL_SECS, INITIAL_BACKOFF_SECS,
    MAX_BACKOFF_SECS, MAX_RECONNECT_ATTEMPTS, WELCOME_TIMEOUT,
};
use crate::credentials::Credentials;

use super::{ChannelError, ChannelEvent, ConnectionState, ServerFrame, SharedConnectionState};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Buffered events between the socket task and the consumer.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Persistent WebSocket connection delivering notification events.
#[derive(Debug)]
pub struct NotificationChannel {
    /// Server URL (http/https; converted to ws/wss for the socket).
    server_url: String,

    /// Shared connection state.
    state: Arc<SharedConnectionState>,

    /// Queue of events produced by the socket task.
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,

    /// Shutdown signal for the socket task.
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl NotificationChannel {
    /// Create a channel for the given backend. Does not connect.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            state: SharedConnectionState::new(),
            event_rx: None,
            shutdown_tx: None,
        }
    }

    /// Get the shared connection state for external observation.
    #[must_use]
    pub fn shared_state(&self) -> Arc<SharedConnectionState> {
        Arc::clone(&self.state)
    }

    /// Establish the connection and start the background socket task.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::AlreadyConnected` if a connection attempt is
    /// already in progress or established.
    pub async fn connect(&mut self, auth_token: String) -> Result<(), ChannelError> {
        if self.state.is_active().await {
            return Err(ChannelError::AlreadyConnected);
        }

        self.state.set(ConnectionState::Connecting).await;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.event_rx = Some(event_rx);
        self.shutdown_tx = Some(shutdown_tx);

        let server_url = self.server_url.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            Self::run_connection_loop(server_url, auth_token, state, event_tx, shutdown_rx).await;
        });

        Ok(())
    }

    /// Tear down the connection (logout / unmount).
    pub async fn disconnect(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.event_rx = None;
        self.state.set(ConnectionState::Disconnected).await;
    }

    /// Receive the next event. Returns `None` when the channel is torn down.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.event_rx.as_mut()?.recv().await
    }

    /// Take the event receiver for use in a spawned consumer task.
    ///
    /// Once taken, `recv` on the channel returns nothing; the channel
    /// itself remains usable for state observation and
    /// teardown. Returns `None` if not connected or already taken.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    /// Run the connection loop with bounded automatic reconnection.
    async fn run_connection_loop(
        server_url: String,
        auth_token: String,
        state: Arc<SharedConnectionState>,
        event_tx: mpsc::Sender<ChannelEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut token = auth_token;
        let mut token_reread = false;
        let mut attempt: u32 = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                log::info!("Channel shutdown requested");
                break;
            }

            match Self::connect_websocket(&server_url, &token).await {
                Ok((write, read)) => {
                    log::info!("Realtime channel connected to {}", server_url);
                    state.set(ConnectionState::Connected).await;
                    attempt = 0;
                    backoff_secs = INITIAL_BACKOFF_SECS;
                    token_reread = false;

                    let shutdown_requested =
                        Self::run_message_loop(write, read, &event_tx, &mut shutdown_rx).await;

                    if shutdown_requested {
                        log::info!("Shutdown requested, exiting reconnection loop");
                        break;
                    }

                    log::warn!("Realtime channel disconnected");
                }
                Err(ChannelError::AuthRejected) => {
                    if token_reread {
                        // Second rejection with a fresh token: stay down
                        // until explicit re-initialization (next login)
                        log::warn!("Auth token still rejected, channel staying disconnected");
                        break;
                    }
                    token_reread = true;

                    // Keyring access can block on OS prompts; keep it off
                    // the async worker
                    match tokio::task::spawn_blocking(Credentials::load).await {
                        Ok(Ok(creds)) => match creds.auth_token() {
                            Some(fresh) => {
                                log::info!("Auth rejected, retrying with re-read token");
                                token = fresh.to_string();
                                continue;
                            }
                            None => {
                                log::warn!("Auth rejected and no stored token, disconnecting");
                                break;
                            }
                        },
                        Ok(Err(e)) => {
                            log::warn!("Auth rejected and token re-read failed: {}", e);
                            break;
                        }
                        Err(e) => {
                            log::warn!("Auth rejected and token re-read panicked: {}", e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to connect realtime channel: {}", e);
                }
            }

            attempt += 1;
            if attempt >= MAX_RECONNECT_ATTEMPTS {
                log::warn!(
                    "Giving up after {} reconnection attempts; next HTTP fetch repairs the gap",
                    attempt
                );
                break;
            }

            // Exponential backoff with jitter
            let jitter_ms = rand::random::<u64>() % 1000;
            let wait_ms = backoff_secs * 1000 + jitter_ms;
            state
                .set(ConnectionState::Reconnecting {
                    attempt,
                    next_retry_ms: wait_ms,
                })
                .await;

            log::info!("Reconnecting in {:.1}s...", wait_ms as f32 / 1000.0);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
                _ = &mut shutdown_rx => {
                    log::info!("Channel shutdown during reconnect backoff");
                    break;
                }
            }

            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }

        state.set(ConnectionState::Disconnected).await;
    }

    /// Connect the WebSocket and complete the auth handshake.
    async fn connect_websocket(
        server_url: &str,
        auth_token: &str,
    ) -> Result<(WsSink, WsSource), ChannelError> {
        let ws_url = format!(
            "{}/ws",
            server_url
                .replace("https://", "wss://")
                .replace("http://", "ws://")
        );

        log::debug!("Connecting realtime channel: {}", ws_url);

        let request = ws_url
            .into_client_request()
            .map_err(|e| ChannelError::ConnectionFailed(format!("invalid URL: {e}")))?;

        let (ws_stream, _) = connect_async(request).await.map_err(|e| {
            ChannelError::ConnectionFailed(format!("WebSocket connect failed: {e}"))
        })?;

        let (mut write, mut read) = ws_stream.split();

        // Token goes in the first frame of the handshake
        let auth_frame = serde_json::json!({ "type": "auth", "token": auth_token });
        write
            .send(Message::Text(auth_frame.to_string()))
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("auth frame failed: {e}")))?;

        // Wait for welcome or unauthorized
        let welcome = tokio::time::timeout(WELCOME_TIMEOUT, async {
            while let Some(msg) = read.next().await {
                if let Ok(Message::Text(text)) = msg {
                    if let Ok(frame) = serde_json::from_str::<ServerFrame>(&text) {
                        match frame.frame_type.as_deref() {
                            Some("welcome") => return Ok(()),
                            Some("unauthorized") => return Err(ChannelError::AuthRejected),
                            _ => {}
                        }
                    }
                }
            }
            Err(ChannelError::ConnectionFailed(
                "WebSocket closed before welcome".into(),
            ))
        })
        .await;

        match welcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ChannelError::Timeout),
        }

        Ok((write, read))
    }

    /// Run the message loop until disconnect.
    ///
    /// Returns `true` if exit was due to the shutdown signal, `false`
    /// otherwise (close, error, stale connection); the caller reconnects
    /// only in the latter case.
    async fn run_message_loop(
        mut write: WsSink,
        mut read: WsSource,
        event_tx: &mpsc::Sender<ChannelEvent>,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> bool {
        let mut last_activity = Instant::now();
        let mut health_interval =
            tokio::time::interval(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS));

        loop {
            tokio::select! {
                msg = read.next() => {
                    last_activity = Instant::now();

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = Self::parse_event(&text) {
                                if event_tx.send(event).await.is_err() {
                                    log::warn!("Event queue closed");
                                    return false;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                log::warn!("Failed to send pong");
                                return false;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("WebSocket closed by server");
                            return false;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error: {}", e);
                            return false;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                _ = health_interval.tick() => {
                    if last_activity.elapsed() > Duration::from_secs(CONNECTION_STALE_TIMEOUT_SECS) {
                        log::warn!(
                            "Connection stale ({}s), reconnecting",
                            last_activity.elapsed().as_secs()
                        );
                        return false;
                    }
                }

                _ = &mut *shutdown_rx => {
                    log::info!("Shutdown signal received");
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
            }
        }
    }

    /// Parse a text frame into a channel event. Unknown frames are ignored;
    /// the protocol may grow events this client does not handle yet.
    fn parse_event(text: &str) -> Option<ChannelEvent> {
        let frame: ServerFrame = serde_json::from_str(text).ok()?;
        match frame.event.as_deref()? {
            "new_notification" => frame.notification.map(ChannelEvent::NewNotification),
            "notification_marked_read" => frame
                .id
                .map(|id| ChannelEvent::NotificationMarkedRead { id }),
            other => {
                log::debug!("Ignoring unknown event '{}'", other);
                None
            }
        }
    }
}
