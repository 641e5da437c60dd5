//! Streaming Client
//!
//! Facade wiring one connector, one serializer, one dispatcher and one
//! subscription counter, plus the router task that turns connector events
//! into subscription deliveries.
//!
//! # Data Flow
//!
//! ```text
//! Connector ──Frame──► Serializer::decode ──► SubscriptionCounter::route ──► Subscriptions
//!     │
//!     ├──Open────► announce pending tags
//!     └──Closed──► terminate subscriptions (error if the connection failed)
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::counter::SubscriptionCounter;
use super::dispatcher::ConnectionActionDispatcher;
use super::subscription::Subscription;
use crate::application::ports::{Connector, ConnectorEvent, ConnectorEvents, Serializer};
use crate::domain::channel::{Channel, ConnectionState};
use crate::domain::error::ClientError;
use crate::domain::subscription::SubscriptionStats;
use crate::infrastructure::codec::JsonSerializer;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;
use crate::infrastructure::ws::{ConnectorConfig, WebSocketConnector};

/// Client multiplexing subscriptions over one connection.
///
/// # Example
///
/// ```rust,no_run
/// use masto_stream::{Channel, ClientConfig, StreamingClient};
///
/// async fn example() -> Result<(), masto_stream::ClientError> {
///     let client = StreamingClient::new(&ClientConfig::new("wss://example.com/api/v1/streaming"));
///     client.connect().await?;
///
///     let mut public = client.subscribe(Channel::public())?;
///     while let Some(event) = public.recv().await {
///         println!("{:?}", event?);
///     }
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct StreamingClient {
    connector: Arc<dyn Connector>,
    dispatcher: Arc<ConnectionActionDispatcher>,
    counter: Arc<SubscriptionCounter>,
    router: CancellationToken,
}

impl StreamingClient {
    /// Create a client with the WebSocket connector and JSON serializer.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let connector = Arc::new(WebSocketConnector::new(ConnectorConfig::from(config)));
        Self::with_parts(connector, Arc::new(JsonSerializer::new()))
    }

    /// Create a client from explicit parts.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_parts(connector: Arc<dyn Connector>, serializer: Arc<dyn Serializer>) -> Self {
        let events = connector.listen();
        let dispatcher = Arc::new(ConnectionActionDispatcher::new(
            Arc::clone(&connector),
            Arc::clone(&serializer),
        ));
        let generation = {
            let connector = Arc::clone(&connector);
            move || connector.generation()
        };
        let counter = Arc::new(
            SubscriptionCounter::new(Arc::clone(&dispatcher) as _).with_generation(generation),
        );
        let router = CancellationToken::new();

        tokio::spawn(run_router(
            events,
            connector.generation(),
            serializer,
            Arc::clone(&counter),
            router.clone(),
        ));

        Self {
            connector,
            dispatcher,
            counter,
            router,
        }
    }

    /// Open the connection. A no-op while open or connecting.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connection` if the transport rejects the
    /// connection.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connector.connect().await
    }

    /// Close the connection and end every subscription cleanly.
    pub async fn close(&self) {
        self.connector.close().await;
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connector.state()
    }

    /// Subscribe to a channel.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error of the first `Subscribe` for the tag,
    /// except `NotConnected`, which defers the subscribe until the
    /// connection opens.
    pub fn subscribe(&self, channel: impl Into<Channel>) -> Result<Subscription, ClientError> {
        Subscription::new(Arc::clone(&self.counter), channel)
    }

    /// Subscribe to a stream carrying one parameter, such as
    /// `subscribe_with("list", "list", "42")`.
    ///
    /// # Errors
    ///
    /// Same as [`StreamingClient::subscribe`].
    pub fn subscribe_with(
        &self,
        stream: &str,
        key: &str,
        value: &str,
    ) -> Result<Subscription, ClientError> {
        self.subscribe(Channel::parameterised(stream, key, value))
    }

    /// Dispatcher for sending actions over the connection.
    #[must_use]
    pub fn dispatcher(&self) -> &ConnectionActionDispatcher {
        &self.dispatcher
    }

    /// Get subscription statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.counter.stats()
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.router.cancel();
    }
}

/// Drive connector events into the subscription counter.
///
/// `closures` is the connector's generation when the listener was
/// registered; each `Closed` event advances it by one.
async fn run_router(
    mut events: ConnectorEvents,
    mut closures: u64,
    serializer: Arc<dyn Serializer>,
    counter: Arc<SubscriptionCounter>,
    cancel: CancellationToken,
) {
    let mut failure: Option<ClientError> = None;

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ConnectorEvent::Frame(frame)) => match serializer.decode(&frame) {
                Ok(inbound) => {
                    counter.route(&inbound);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed frame");
                    metrics::record_frame_dropped();
                }
            },
            Some(ConnectorEvent::Error(e)) => failure = Some(e),
            Some(ConnectorEvent::StateChanged(ConnectionState::Open)) => {
                failure = None;
                counter.announce_pending();
            }
            Some(ConnectorEvent::StateChanged(ConnectionState::Closed)) => {
                closures += 1;
                counter.close(closures, failure.take().as_ref());
            }
            Some(ConnectorEvent::StateChanged(_)) => {}
            None => break,
        }
    }

    tracing::debug!("Router stopped");
}
