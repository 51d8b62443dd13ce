//! Test doubles for transport-facing code.
//!
//! [`MockTransport`] is an in-memory [`ChangeTransport`] that records
//! every connect and disconnect, exposes the most recent sink so tests
//! can inject payloads and status transitions, and can be scripted to
//! fail a number of upcoming connects.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::FeedError;
use crate::event::TransportPayload;
use crate::state::ChannelStatus;
use crate::transport::{ChannelRequest, ChangeTransport, TransportSink};

// ---------------------------------------------------------------------------
// Payload constructors
// ---------------------------------------------------------------------------

/// Builds an `INSERT` payload carrying `record` as the new row.
#[must_use]
pub fn insert_payload(table: &str, record: Value) -> TransportPayload {
    TransportPayload {
        event: "INSERT".into(),
        schema: "public".into(),
        table: table.into(),
        record: Some(record),
        old_record: None,
        commit_timestamp_ms: 0,
    }
}

/// Builds an `UPDATE` payload with both row versions.
#[must_use]
pub fn update_payload(table: &str, record: Value, old_record: Value) -> TransportPayload {
    TransportPayload {
        event: "UPDATE".into(),
        schema: "public".into(),
        table: table.into(),
        record: Some(record),
        old_record: Some(old_record),
        commit_timestamp_ms: 0,
    }
}

/// Builds a `DELETE` payload carrying only the (possibly partial) old row.
#[must_use]
pub fn delete_payload(table: &str, old_record: Value) -> TransportPayload {
    TransportPayload {
        event: "DELETE".into(),
        schema: "public".into(),
        table: table.into(),
        record: None,
        old_record: Some(old_record),
        commit_timestamp_ms: 0,
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockInner {
    connects: Vec<ChannelRequest>,
    disconnects: Vec<String>,
    sink: Option<TransportSink>,
    connect_results: VecDeque<Result<(), FeedError>>,
}

/// In-memory transport for tests.
///
/// Clones share state, so a test can hand one clone to the supervisor
/// and keep another to observe and drive it.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    /// Creates a transport that accepts every connect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `n` connects to fail with a connection error.
    /// Connects beyond the scripted ones succeed.
    pub fn fail_next_connects(&self, n: usize) {
        let mut inner = self.inner.lock();
        for _ in 0..n {
            inner
                .connect_results
                .push_back(Err(FeedError::ConnectionFailed("scripted failure".into())));
        }
    }

    /// Number of connect calls observed so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects.len()
    }

    /// Number of disconnect calls observed so far.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.inner.lock().disconnects.len()
    }

    /// The most recent connect request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<ChannelRequest> {
        self.inner.lock().connects.last().cloned()
    }

    /// Channel names passed to disconnect, in call order.
    #[must_use]
    pub fn disconnected_channels(&self) -> Vec<String> {
        self.inner.lock().disconnects.clone()
    }

    /// Delivers a status transition through the most recent sink.
    /// Returns `false` if no connect has happened or the receiver side
    /// is gone.
    pub fn emit_status(&self, status: ChannelStatus) -> bool {
        let sink = self.inner.lock().sink.clone();
        sink.is_some_and(|sink| sink.status(status))
    }

    /// Delivers a payload through the most recent sink.
    pub fn emit_payload(&self, payload: TransportPayload) -> bool {
        let sink = self.inner.lock().sink.clone();
        sink.is_some_and(|sink| sink.payload(payload))
    }
}

#[async_trait]
impl ChangeTransport for MockTransport {
    async fn connect(
        &self,
        request: ChannelRequest,
        sink: TransportSink,
    ) -> Result<(), FeedError> {
        let mut inner = self.inner.lock();
        inner.connects.push(request);
        let result = inner.connect_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            inner.sink = Some(sink);
        }
        result
    }

    async fn disconnect(&self, channel: &str) -> Result<(), FeedError> {
        self.inner.lock().disconnects.push(channel.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::event::EventKind;

    fn request(channel: &str) -> ChannelRequest {
        ChannelRequest {
            channel: channel.into(),
            schema: "public".into(),
            table: "t".into(),
            events: vec![EventKind::Insert],
            filter: None,
        }
    }

    #[tokio::test]
    async fn test_mock_records_connects_and_disconnects() {
        let transport = MockTransport::new();
        let (payload_tx, _payload_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, _status_rx) = tokio::sync::mpsc::unbounded_channel();

        transport
            .connect(request("c1"), TransportSink::new(payload_tx, status_tx))
            .await
            .unwrap();
        transport.disconnect("c1").await.unwrap();

        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnected_channels(), vec!["c1"]);
        assert_eq!(transport.last_request().unwrap().channel, "c1");
    }

    #[tokio::test]
    async fn test_mock_scripted_failures_then_success() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2);

        let (payload_tx, _payload_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, _status_rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = TransportSink::new(payload_tx, status_tx);

        assert!(transport.connect(request("c1"), sink.clone()).await.is_err());
        assert!(transport.connect(request("c2"), sink.clone()).await.is_err());
        assert!(transport.connect(request("c3"), sink).await.is_ok());
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_emits_through_latest_sink() {
        let transport = MockTransport::new();
        assert!(!transport.emit_status(ChannelStatus::Established));

        let (payload_tx, mut payload_rx) = tokio::sync::mpsc::unbounded_channel();
        let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel();
        transport
            .connect(request("c1"), TransportSink::new(payload_tx, status_tx))
            .await
            .unwrap();

        assert!(transport.emit_status(ChannelStatus::Established));
        assert!(transport.emit_payload(insert_payload("t", json!({"id": 1}))));
        assert_eq!(status_rx.recv().await, Some(ChannelStatus::Established));
        assert_eq!(payload_rx.recv().await.unwrap().table, "t");
    }
}
