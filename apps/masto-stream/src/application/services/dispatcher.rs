//! Action Dispatcher Service
//!
//! Stateless translator from typed actions to frames sent through the
//! connector. Validation runs before encoding, so an invalid action never
//! reaches the transport.

use std::sync::Arc;

use crate::application::ports::{ActionDispatcher, Connector, Serializer};
use crate::domain::action::{OutboundAction, RawAction};
use crate::domain::error::ClientError;
use crate::infrastructure::metrics;

/// Dispatcher sending actions over the shared connection.
pub struct ConnectionActionDispatcher {
    connector: Arc<dyn Connector>,
    serializer: Arc<dyn Serializer>,
}

impl ConnectionActionDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            connector,
            serializer,
        }
    }

    /// Validate and dispatch an untyped action.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAction` for unknown kinds or missing fields,
    /// otherwise the same errors as [`ActionDispatcher::dispatch`].
    pub fn dispatch_raw(&self, raw: RawAction) -> Result<(), ClientError> {
        let action = OutboundAction::try_from(raw).inspect_err(|e| {
            tracing::error!(error = %e, "Rejected outbound action");
        })?;
        self.dispatch(action)
    }
}

impl ActionDispatcher for ConnectionActionDispatcher {
    fn dispatch(&self, action: OutboundAction) -> Result<(), ClientError> {
        let kind = action.kind();

        action.validate().inspect_err(|e| {
            tracing::error!(error = %e, kind = kind.as_str(), "Rejected outbound action");
        })?;

        let frame = self.serializer.encode(&action)?;

        tracing::debug!(kind = kind.as_str(), frame = frame.as_str(), "Dispatching action");

        match self.connector.send(frame) {
            Ok(()) => {
                metrics::record_action_dispatched(kind);
                Ok(())
            }
            Err(e) => {
                metrics::record_dispatch_failure(kind);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockConnector;
    use crate::domain::action::HttpMethod;
    use crate::domain::channel::{Channel, ConnectionState, Frame};
    use crate::infrastructure::codec::JsonSerializer;

    fn dispatcher(connector: MockConnector) -> ConnectionActionDispatcher {
        ConnectionActionDispatcher::new(Arc::new(connector), Arc::new(JsonSerializer::new()))
    }

    #[test]
    fn unknown_action_type_never_sends() {
        let mut connector = MockConnector::new();
        connector.expect_send().never();

        let raw = RawAction {
            kind: "unknown".to_string(),
            path: Some("/api/v2/unknown".to_string()),
            ..RawAction::default()
        };

        let err = dispatcher(connector).dispatch_raw(raw).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedAction(_)));
    }

    #[test]
    fn malformed_typed_action_never_sends() {
        let mut connector = MockConnector::new();
        connector.expect_send().never();

        let action = OutboundAction::request(HttpMethod::Get, "no-leading-slash", None);
        let err = dispatcher(connector).dispatch(action).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedAction(_)));
    }

    #[test]
    fn subscribe_sends_one_frame() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .withf(|frame: &Frame| frame.as_str().contains(r#""type":"subscribe""#))
            .times(1)
            .returning(|_| Ok(()));

        dispatcher(connector)
            .dispatch(OutboundAction::subscribe(&Channel::public()))
            .unwrap();
    }

    #[test]
    fn not_connected_is_propagated_unchanged() {
        let mut connector = MockConnector::new();
        connector.expect_send().times(1).returning(|_| {
            Err(ClientError::NotConnected {
                state: ConnectionState::Disconnected,
            })
        });

        let err = dispatcher(connector)
            .dispatch(OutboundAction::unsubscribe(&Channel::public()))
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::NotConnected {
                state: ConnectionState::Disconnected
            }
        );
    }
}
