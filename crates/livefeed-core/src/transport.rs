//! The transport boundary.
//!
//! The manager consumes the transport as an opaque dependency: it asks
//! for a channel on (schema, table, kinds, filter), receives payloads and
//! status transitions through a [`TransportSink`], and can disconnect.
//! The wire protocol behind the trait is out of scope.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::FeedError;
use crate::event::{EventKind, TransportPayload};
use crate::state::ChannelStatus;

// ---------------------------------------------------------------------------
// ChannelRequest
// ---------------------------------------------------------------------------

/// What the supervisor asks the transport to open.
///
/// The channel name is unique per process; the transport is expected to
/// register one listener per requested event kind.
#[derive(Debug, Clone)]
pub struct ChannelRequest {
    /// Process-unique channel name.
    pub channel: String,
    /// Schema namespace of the watched table.
    pub schema: String,
    /// Watched table name.
    pub table: String,
    /// Event kinds to listen for.
    pub events: Vec<EventKind>,
    /// Optional row filter expression (transport-specific syntax).
    pub filter: Option<String>,
}

// ---------------------------------------------------------------------------
// TransportSink
// ---------------------------------------------------------------------------

/// Where the transport delivers payloads and status transitions for one
/// channel.
///
/// Both sends are non-blocking; a failed send means the subscription is
/// tearing down and the message is dropped, which is the required
/// behavior for callbacks arriving after close.
#[derive(Debug, Clone)]
pub struct TransportSink {
    payloads: mpsc::UnboundedSender<TransportPayload>,
    status: mpsc::UnboundedSender<ChannelStatus>,
}

impl TransportSink {
    /// Creates a sink from the supervisor's inbound channels.
    #[must_use]
    pub fn new(
        payloads: mpsc::UnboundedSender<TransportPayload>,
        status: mpsc::UnboundedSender<ChannelStatus>,
    ) -> Self {
        Self { payloads, status }
    }

    /// Delivers a change payload. Returns `false` if the subscription is
    /// no longer listening.
    pub fn payload(&self, payload: TransportPayload) -> bool {
        self.payloads.send(payload).is_ok()
    }

    /// Delivers a status transition. Returns `false` if the subscription
    /// is no longer listening.
    pub fn status(&self, status: ChannelStatus) -> bool {
        self.status.send(status).is_ok()
    }
}

// ---------------------------------------------------------------------------
// ChangeTransport
// ---------------------------------------------------------------------------

/// The connect/disconnect primitive the supervisor drives.
///
/// `connect` initiates the channel; establishment is reported
/// asynchronously via [`TransportSink::status`], so a successful return
/// only means the attempt was started. A connect error is treated by the
/// supervisor exactly like an `Error` status: retried against the
/// backoff budget.
#[async_trait]
pub trait ChangeTransport: Send + Sync + 'static {
    /// Opens a channel for the given request, delivering payloads and
    /// status transitions into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the attempt could not be started.
    async fn connect(&self, request: ChannelRequest, sink: TransportSink)
        -> Result<(), FeedError>;

    /// Releases the channel with the given name. Idempotent; unknown
    /// names are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if teardown fails; the supervisor logs and
    /// ignores this during close.
    async fn disconnect(&self, channel: &str) -> Result<(), FeedError>;
}
