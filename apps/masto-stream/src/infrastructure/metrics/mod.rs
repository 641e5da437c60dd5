//! Prometheus Metrics Module
//!
//! Counters and gauges for the streaming client. Recording goes through the
//! `metrics` facade and is a no-op until a recorder is installed, so the
//! library can be embedded without exporting anything.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received and dropped as malformed
//! - **Actions**: actions dispatched and failed by kind
//! - **Subscriptions**: active channel tags
//! - **Connection**: state transitions

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::action::ActionKind;
use crate::domain::channel::ConnectionState;

// =============================================================================
// Exporter
// =============================================================================

static EXPORTER_PORT: OnceLock<u16> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Later calls are no-ops. Must be called inside a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the recorder or the listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if EXPORTER_PORT.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()?;

    let _ = EXPORTER_PORT.set(port);
    register_metrics();
    tracing::info!(port, "Metrics exporter listening");
    Ok(())
}

/// Port of the installed exporter, if any.
#[must_use]
pub fn exporter_port() -> Option<u16> {
    EXPORTER_PORT.get().copied()
}

fn register_metrics() {
    describe_counter!(
        "masto_stream_frames_received_total",
        "Total frames received from the streaming endpoint"
    );
    describe_counter!(
        "masto_stream_frames_dropped_total",
        "Total inbound frames dropped as malformed"
    );
    describe_counter!(
        "masto_stream_actions_dispatched_total",
        "Total actions sent over the connection by kind"
    );
    describe_counter!(
        "masto_stream_dispatch_failures_total",
        "Total actions that could not be sent by kind"
    );
    describe_gauge!(
        "masto_stream_active_tags",
        "Number of channel tags with live subscriptions"
    );
    describe_counter!(
        "masto_stream_connection_transitions_total",
        "Total connection state transitions by target state"
    );
}

// =============================================================================
// Recording
// =============================================================================

/// Record a frame received from the connection.
pub fn record_frame_received() {
    counter!("masto_stream_frames_received_total").increment(1);
}

/// Record a frame dropped because it could not be decoded.
pub fn record_frame_dropped() {
    counter!("masto_stream_frames_dropped_total").increment(1);
}

/// Record an action sent over the connection.
pub fn record_action_dispatched(kind: ActionKind) {
    counter!("masto_stream_actions_dispatched_total", "kind" => kind.as_str()).increment(1);
}

/// Record an action the connector refused.
pub fn record_dispatch_failure(kind: ActionKind) {
    counter!("masto_stream_dispatch_failures_total", "kind" => kind.as_str()).increment(1);
}

/// Update the number of channel tags with live subscriptions.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_tags(count: usize) {
    gauge!("masto_stream_active_tags").set(count as f64);
}

/// Record a connection state transition.
pub fn record_connection_state(state: ConnectionState) {
    counter!("masto_stream_connection_transitions_total", "state" => state.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_frame_dropped();
        record_action_dispatched(ActionKind::Subscribe);
        record_dispatch_failure(ActionKind::Request);
        set_active_tags(3);
        record_connection_state(ConnectionState::Open);
        assert!(exporter_port().is_none());
    }
}
