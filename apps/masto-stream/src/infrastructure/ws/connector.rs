//! WebSocket Connector
//!
//! Owns the single physical connection to the streaming endpoint. A
//! background session task reads frames, writes queued frames and keeps the
//! connection alive with pings; everything it observes is fanned out to the
//! registered listeners.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──handshake ok──► Open
//!                                  │                        │
//!                            handshake failed      close() │ transport lost
//!                                  │                        ▼        │
//!                                  │                     Closing     │
//!                                  ▼                        ▼        ▼
//!                                Closed ◄────────────────────────────┘
//! ```
//!
//! An abnormal transition to `Closed` is preceded by an `Error` event.
//! There is no automatic reconnect: a `Closed` connector can be connected
//! again by the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::application::ports::{Connector, ConnectorEvent, ConnectorEvents};
use crate::domain::channel::{ConnectionState, Frame};
use crate::domain::error::ClientError;
use crate::infrastructure::config::{ClientConfig, Credential, HeartbeatSettings};
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration of the WebSocket connector.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Streaming endpoint URL.
    pub endpoint: String,
    /// Access token sent on the upgrade request.
    pub credential: Option<Credential>,
    /// Keepalive settings.
    pub heartbeat: HeartbeatSettings,
    /// Sink for connection logs.
    pub logger: Option<Dispatch>,
}

impl ConnectorConfig {
    /// Configuration for `endpoint` with default keepalive and no token.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: None,
            heartbeat: HeartbeatSettings::default(),
            logger: None,
        }
    }
}

impl From<&ClientConfig> for ConnectorConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            credential: config.credential.clone(),
            heartbeat: config.heartbeat,
            logger: config.logger.clone(),
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// State shared between the connector and its session task.
#[derive(Default)]
struct Shared {
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ConnectorEvent>>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut listeners = self.listeners.lock();
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            *state = next;
            if next == ConnectionState::Closed {
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
        }

        metrics::record_connection_state(next);
        listeners.retain(|tx| tx.send(ConnectorEvent::StateChanged(next)).is_ok());
    }

    fn emit(&self, event: &ConnectorEvent) {
        self.listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Abnormal closure: `Error` then `StateChanged(Closed)`.
    ///
    /// Ignored while closing or closed.
    fn fail(&self, error: &ClientError) -> bool {
        let mut listeners = self.listeners.lock();
        {
            let mut state = self.state.write();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return false;
            }
            *state = ConnectionState::Closed;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        metrics::record_connection_state(ConnectionState::Closed);
        listeners.retain(|tx| tx.send(ConnectorEvent::Error(error.clone())).is_ok());
        listeners.retain(|tx| {
            tx.send(ConnectorEvent::StateChanged(ConnectionState::Closed))
                .is_ok()
        });
        true
    }
}

/// Running session task.
struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Connector
// =============================================================================

/// Connector over `tokio-tungstenite`.
pub struct WebSocketConnector {
    config: ConnectorConfig,
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl WebSocketConnector {
    /// Create a disconnected connector.
    #[must_use]
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Run `f` with the configured logger as the default subscriber.
    fn log(&self, f: impl FnOnce()) {
        match &self.config.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    fn build_request(&self) -> Result<Request, ClientError> {
        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(format!("invalid endpoint: {e}")))?;

        if let Some(credential) = &self.config.credential {
            let value = HeaderValue::from_str(&credential.bearer())
                .map_err(|e| ClientError::Connection(format!("invalid access token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }

    async fn handshake(&self) -> Result<WsStream, ClientError> {
        let request = self.build_request()?;
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Ok(stream)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(), ClientError> {
        let mut session = self.session.lock().await;

        if !self.shared.state().can_connect() {
            return Ok(());
        }

        if let Some(old) = session.take() {
            old.cancel.cancel();
            let _ = old.handle.await;
        }

        self.shared.set_state(ConnectionState::Connecting);
        self.log(|| tracing::info!(endpoint = %self.config.endpoint, "Connecting"));

        let stream = match self.handshake().await {
            Ok(stream) => stream,
            Err(e) => {
                self.log(|| tracing::error!(error = %e, "Connection failed"));
                self.shared.fail(&e);
                return Err(e);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);
        self.shared.set_state(ConnectionState::Open);

        let cancel = CancellationToken::new();
        let task = run_session(
            stream,
            outbound_rx,
            Arc::clone(&self.shared),
            self.config.heartbeat,
            cancel.clone(),
        );
        let handle = match &self.config.logger {
            Some(dispatch) => tokio::spawn(task.with_subscriber(dispatch.clone())),
            None => tokio::spawn(task),
        };

        *session = Some(Session { cancel, handle });
        Ok(())
    }

    fn send(&self, frame: Frame) -> Result<(), ClientError> {
        let state = self.shared.state();
        if !state.is_open() {
            return Err(ClientError::NotConnected { state });
        }

        let outbound = self.shared.outbound.lock();
        let not_connected = || ClientError::NotConnected {
            state: self.shared.state(),
        };

        outbound
            .as_ref()
            .ok_or_else(not_connected)?
            .send(Message::text(frame.into_inner()))
            .map_err(|_| not_connected())
    }

    async fn close(&self) {
        let mut session = self.session.lock().await;

        if matches!(
            self.shared.state(),
            ConnectionState::Disconnected | ConnectionState::Closed
        ) {
            if let Some(old) = session.take() {
                let _ = old.handle.await;
            }
            return;
        }

        self.shared.set_state(ConnectionState::Closing);

        if let Some(current) = session.take() {
            current.cancel.cancel();
            let _ = current.handle.await;
        }

        self.shared.outbound.lock().take();
        self.shared.set_state(ConnectionState::Closed);
        self.log(|| tracing::info!(endpoint = %self.config.endpoint, "Connection closed"));
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    fn listen(&self) -> ConnectorEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.listeners.lock().push(tx);
        rx
    }
}

impl Drop for WebSocketConnector {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

// =============================================================================
// Session Task
// =============================================================================

async fn run_session(
    stream: WsStream,
    outbound: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    heartbeat: HeartbeatSettings,
    cancel: CancellationToken,
) {
    tracing::info!("Connection open");

    let result = drive(stream, outbound, &shared, heartbeat, &cancel).await;

    shared.outbound.lock().take();

    if let Err(e) = result {
        if shared.fail(&e) {
            tracing::warn!(error = %e, "Connection lost");
        }
    } else {
        tracing::debug!("Session stopped");
    }
}

async fn drive(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shared: &Shared,
    heartbeat: HeartbeatSettings,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    let (mut write, mut read) = stream.split();
    let mut ping = heartbeat.ping_interval.map(ping_interval);
    // First ping sent since the server was last heard from.
    let mut unanswered_since: Option<Instant> = None;

    let lost = |e: &dyn std::fmt::Display| ClientError::Connection(e.to_string());

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                let _ = write.close().await;
                return Ok(());
            }
            () = next_tick(&mut ping) => {
                if let Some(since) = unanswered_since
                    && since.elapsed() > heartbeat.pong_timeout
                {
                    return Err(ClientError::Connection(format!(
                        "no response from server for {}ms",
                        since.elapsed().as_millis()
                    )));
                }
                unanswered_since.get_or_insert_with(Instant::now);
                write.send(Message::Ping(Vec::new().into())).await.map_err(|e| lost(&e))?;
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return Ok(());
                };
                write.send(message).await.map_err(|e| lost(&e))?;
            }
            message = read.next() => {
                unanswered_since = None;
                match message {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_frame_received();
                        shared.emit(&ConnectorEvent::Frame(Frame::new(text.as_str())));
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            metrics::record_frame_received();
                            shared.emit(&ConnectorEvent::Frame(Frame::new(text)));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, len = data.len(), "Dropping non UTF-8 binary frame");
                            metrics::record_frame_dropped();
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await.map_err(|e| lost(&e))?;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "server closed the connection".to_string(),
                            |f| {
                                format!(
                                    "server closed the connection: {} {}",
                                    u16::from(f.code),
                                    f.reason.as_str()
                                )
                            },
                        );
                        return Err(ClientError::Connection(reason));
                    }
                    Some(Err(e)) => return Err(lost(&e)),
                    None => {
                        return Err(ClientError::Connection("connection reset".to_string()));
                    }
                }
            }
        }
    }
}

fn ping_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
