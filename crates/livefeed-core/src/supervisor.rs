//! Channel supervision.
//!
//! One supervisor task owns one transport channel end to end: it connects,
//! forwards payloads to the router, reacts to status transitions, schedules
//! bounded reconnects, and tears the channel down on close.
//!
//! # Architecture
//!
//! ```text
//!  subscribe() ──spawns──▶ supervisor task
//!                              │  tokio::select!
//!                              ├── payload_rx ──▶ EventRouter ──▶ handlers
//!                              ├── status_rx  ──▶ state machine ──▶ RetryTimer
//!                              ├── retry_rx   ──▶ reconnect attempt
//!                              └── shutdown   ──▶ disconnect + exit
//! ```
//!
//! All dispatch happens on the supervisor task, so handlers observe events
//! in transport delivery order. The caller holds a [`SubscriptionHandle`];
//! dropping it closes the subscription.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};

use crate::backoff::{BackoffPolicy, RetryTimer};
use crate::error::FeedError;
use crate::event::{EventKind, TransportPayload};
use crate::metrics::{FeedCounters, SubscriptionMetrics};
use crate::router::{EventHandlers, EventRouter, RouteOutcome};
use crate::spec::{ChannelIdPolicy, SubscriptionSpec};
use crate::state::{ChannelStatus, ConnectionState};
use crate::transport::{ChannelRequest, ChangeTransport, TransportSink};

// ---------------------------------------------------------------------------
// SupervisorConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for one supervised subscription.
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Reconnect policy applied after channel errors and timeouts.
    pub backoff: BackoffPolicy,
    /// How channel names are minted across reconnects.
    pub channel_id_policy: ChannelIdPolicy,
}

impl SupervisorConfig {
    /// Returns the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reconnect backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the channel naming policy.
    #[must_use]
    pub fn with_channel_id_policy(mut self, policy: ChannelIdPolicy) -> Self {
        self.channel_id_policy = policy;
        self
    }
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// State shared between the supervisor task and the handle.
struct Shared {
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
    failures: AtomicU32,
    counters: FeedCounters,
    retry: RetryTimer,
    channel: Mutex<String>,
    created_at: Instant,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Idle),
            closed: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            counters: FeedCounters::default(),
            retry: RetryTimer::new(),
            channel: Mutex::new(String::new()),
            created_at: Instant::now(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Applies a transition, returning `true` if the state changed.
    /// Transitions the state machine forbids are dropped, which covers
    /// late transport callbacks racing a close.
    fn set_state(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        if !state.can_transition(next) {
            tracing::debug!(from = %*state, to = %next, "dropping illegal state transition");
            return false;
        }
        *state = next;
        true
    }
}

// ---------------------------------------------------------------------------
// subscribe
// ---------------------------------------------------------------------------

/// Opens a supervised subscription over `transport`.
///
/// Validates `spec`, mints a process-unique channel name, and spawns the
/// supervisor task, which connects asynchronously. Must be called from
/// within a tokio runtime.
///
/// # Errors
///
/// Returns a configuration error when `spec` names no table or no event
/// kinds. Connect failures are not surfaced here; they drive the retry
/// machinery and are observable via [`SubscriptionHandle::state`].
pub fn subscribe<T>(
    transport: Arc<dyn ChangeTransport>,
    spec: SubscriptionSpec,
    config: SupervisorConfig,
    handlers: EventHandlers<T>,
) -> Result<SubscriptionHandle, FeedError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    spec.validate()?;

    let router = EventRouter::new(handlers, spec.emit_side_effects());
    let shared = Arc::new(Shared::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (payload_tx, payload_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let (retry_tx, retry_rx) = mpsc::unbounded_channel();

    let supervisor = Supervisor {
        transport,
        spec,
        config,
        router,
        shared: Arc::clone(&shared),
        payload_tx,
        status_tx,
        retry_tx,
    };
    tokio::spawn(supervisor.run(shutdown_rx, payload_rx, status_rx, retry_rx));

    Ok(SubscriptionHandle {
        shared,
        shutdown: shutdown_tx,
    })
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct Supervisor<T> {
    transport: Arc<dyn ChangeTransport>,
    spec: SubscriptionSpec,
    config: SupervisorConfig,
    router: EventRouter<T>,
    shared: Arc<Shared>,
    payload_tx: mpsc::UnboundedSender<TransportPayload>,
    status_tx: mpsc::UnboundedSender<ChannelStatus>,
    retry_tx: mpsc::UnboundedSender<u64>,
}

impl<T: DeserializeOwned + Send + Sync + 'static> Supervisor<T> {
    async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut payload_rx: mpsc::UnboundedReceiver<TransportPayload>,
        mut status_rx: mpsc::UnboundedReceiver<ChannelStatus>,
        mut retry_rx: mpsc::UnboundedReceiver<u64>,
    ) {
        self.connect_attempt().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                Some(generation) = retry_rx.recv() => {
                    if self.shared.is_closed() {
                        break;
                    }
                    // A slot can queue its fire in the instant before a
                    // re-arm or cancel aborts it; such fires are stale.
                    if !self.shared.retry.is_current(generation) {
                        tracing::trace!("ignoring superseded retry fire");
                        continue;
                    }
                    self.connect_attempt().await;
                }
                Some(status) = status_rx.recv() => {
                    if !self.handle_status(status) {
                        break;
                    }
                }
                Some(payload) = payload_rx.recv() => {
                    self.handle_payload(payload);
                }
            }
        }

        self.teardown().await;
    }

    /// One connect attempt against the transport. Failures are fed back
    /// through the status channel so scheduled retries and transport
    /// errors take the same path.
    async fn connect_attempt(&self) {
        if self.shared.set_state(ConnectionState::Connecting) {
            self.router.notify_state(ConnectionState::Connecting);
        }

        let stale = {
            let mut slot = self.shared.channel.lock();
            let stale = (!slot.is_empty()
                && self.config.channel_id_policy == ChannelIdPolicy::PerAttempt)
                .then(|| slot.clone());
            if slot.is_empty() || stale.is_some() {
                *slot = self.spec.mint_channel_name();
            }
            stale
        };
        if let Some(old) = stale {
            if let Err(err) = self.transport.disconnect(&old).await {
                tracing::debug!(channel = %old, error = %err, "stale channel release failed");
            }
        }

        let channel = self.shared.channel.lock().clone();
        let request = ChannelRequest {
            channel: channel.clone(),
            schema: self.spec.schema().to_string(),
            table: self.spec.table_name().to_string(),
            events: self.spec.events().to_vec(),
            filter: self.spec.filter().map(str::to_string),
        };
        let sink = TransportSink::new(self.payload_tx.clone(), self.status_tx.clone());

        FeedCounters::incr(&self.shared.counters.connect_attempts);
        tracing::debug!(channel = %channel, table = %self.spec.table_name(), "connecting channel");

        if let Err(err) = self.transport.connect(request, sink).await {
            tracing::warn!(channel = %channel, error = %err, "channel connect failed");
            let _ = self.status_tx.send(ChannelStatus::Error);
        }
    }

    /// Applies one transport status. Returns `false` when the channel
    /// reached a remote terminal close and the task should exit.
    fn handle_status(&self, status: ChannelStatus) -> bool {
        if self.shared.is_closed() {
            return true;
        }
        match status {
            ChannelStatus::Connecting => {
                if self.shared.set_state(ConnectionState::Connecting) {
                    self.router.notify_state(ConnectionState::Connecting);
                }
            }
            ChannelStatus::Established => {
                // Only honor an establishment the state machine accepts;
                // otherwise the pending retry stays armed.
                if self.shared.set_state(ConnectionState::Established) {
                    self.shared.failures.store(0, Ordering::SeqCst);
                    self.shared.retry.cancel();
                    self.router.notify_state(ConnectionState::Established);
                    tracing::info!(channel = %self.shared.channel.lock(), "channel established");
                }
            }
            ChannelStatus::Error => self.handle_failure(ConnectionState::Error),
            ChannelStatus::TimedOut => self.handle_failure(ConnectionState::TimedOut),
            ChannelStatus::Closed => {
                tracing::info!(channel = %self.shared.channel.lock(), "channel closed by transport");
                return false;
            }
        }
        true
    }

    /// Error and timeout share the retry path: count the failure, and
    /// either arm the single retry slot or exhaust the budget. Re-arming
    /// while a retry is pending replaces it, so at most one retry is
    /// ever scheduled.
    fn handle_failure(&self, kind: ConnectionState) {
        if self.shared.set_state(kind) {
            self.router.notify_state(kind);
        }

        let failures = self.shared.failures.load(Ordering::SeqCst);
        if failures < self.config.backoff.max_attempts {
            let delay = self.config.backoff.delay_for_attempt(failures);
            self.shared.retry.arm(delay, self.retry_tx.clone());
            self.shared.failures.store(failures + 1, Ordering::SeqCst);
            FeedCounters::incr(&self.shared.counters.retries_scheduled);
            tracing::info!(
                channel = %self.shared.channel.lock(),
                failures = failures + 1,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
        } else {
            self.shared.retry.cancel();
            if self.shared.set_state(ConnectionState::Exhausted) {
                self.router.notify_state(ConnectionState::Exhausted);
            }
            tracing::warn!(
                channel = %self.shared.channel.lock(),
                max_attempts = self.config.backoff.max_attempts,
                "retry budget exhausted"
            );
        }
    }

    fn handle_payload(&self, payload: TransportPayload) {
        if self.shared.is_closed() {
            tracing::trace!(table = %payload.table, "dropping payload after close");
            return;
        }
        // The transport can misdeliver kinds outside the requested event
        // set; those must not reach a wildcard handler.
        if let Some(kind) = EventKind::from_wire(&payload.event) {
            if !kind.is_wildcard() && !self.spec.watches(kind) {
                tracing::trace!(kind = %kind, table = %payload.table, "dropping unrequested event kind");
                FeedCounters::incr(&self.shared.counters.events_ignored);
                return;
            }
        }
        match self.router.route(payload) {
            RouteOutcome::Routed => FeedCounters::incr(&self.shared.counters.events_routed),
            RouteOutcome::Ignored => FeedCounters::incr(&self.shared.counters.events_ignored),
            RouteOutcome::HandlerPanicked => {
                FeedCounters::incr(&self.shared.counters.handler_panics);
            }
        }
    }

    async fn teardown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.retry.cancel();
        self.shared.set_state(ConnectionState::Closed);

        let channel = self.shared.channel.lock().clone();
        if !channel.is_empty() {
            if let Err(err) = self.transport.disconnect(&channel).await {
                tracing::warn!(channel = %channel, error = %err, "channel release failed");
            }
        }
        self.router.notify_state(ConnectionState::Closed);
        tracing::debug!(channel = %channel, "supervisor task exited");
    }
}

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Owning handle for one supervised subscription.
///
/// Dropping the handle closes the subscription; call [`close`](Self::close)
/// for an explicit close. Close is terminal: the subscription never
/// reconnects afterwards, and late payloads are dropped silently.
#[must_use = "dropping the handle closes the subscription"]
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
}

impl SubscriptionHandle {
    /// Closes the subscription. Idempotent, and safe to call from inside
    /// a change handler: the state flips to `Closed` and the pending
    /// retry is cancelled synchronously, while the transport channel is
    /// released by the supervisor task in the background.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.retry.cancel();
        self.shared.set_state(ConnectionState::Closed);
        let _ = self.shutdown.send(true);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Returns `true` once the subscription has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Name of the transport channel currently backing the subscription.
    /// Changes across reconnects under [`ChannelIdPolicy::PerAttempt`].
    #[must_use]
    pub fn channel_name(&self) -> String {
        self.shared.channel.lock().clone()
    }

    /// Point-in-time metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> SubscriptionMetrics {
        SubscriptionMetrics {
            state: self.state(),
            consecutive_failures: self.shared.failures.load(Ordering::SeqCst),
            retry_pending: self.shared.retry.is_armed(),
            connect_attempts: FeedCounters::get(&self.shared.counters.connect_attempts),
            retries_scheduled: FeedCounters::get(&self.shared.counters.retries_scheduled),
            events_routed: FeedCounters::get(&self.shared.counters.events_routed),
            events_ignored: FeedCounters::get(&self.shared.counters.events_ignored),
            handler_panics: FeedCounters::get(&self.shared.counters.handler_panics),
            age: self.shared.created_at.elapsed(),
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
