//! # Livefeed Core
//!
//! Realtime change-subscription management: supervises one transport
//! channel per subscription, routes row-change events to typed callbacks,
//! and reconnects with bounded exponential backoff.
//!
//! ## Modules
//!
//! - [`spec`] - Subscription specification and validation
//! - [`supervisor`] - Channel lifecycle supervision and the caller handle
//! - [`router`] - Event demultiplexing to typed handlers
//! - [`backoff`] - Reconnect policy and the single-slot retry timer
//! - [`transport`] - Transport abstraction crossed by payloads and status
//! - [`testing`] - Mock transport and payload constructors
//!
//! ## Architecture
//!
//! ```text
//! SubscriptionSpec ──▶ subscribe() ──▶ supervisor task (one per channel)
//!                                          │
//!                     ChangeTransport ◀────┤ connect / disconnect
//!                     TransportSink   ────▶│ payloads + status
//!                                          │
//!                                    EventRouter ──▶ on_insert / on_update
//!                                                    on_delete / on_any
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let handle = subscribe(
//!     transport,
//!     SubscriptionSpec::table("maintenance_tasks").with_event(EventKind::Insert),
//!     SupervisorConfig::default(),
//!     EventHandlers::new().on_insert(|ev: &ChangeEvent<Task>| {
//!         println!("new task: {:?}", ev.new);
//!     }),
//! )?;
//! // ... later
//! handle.close();
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Common test patterns that are acceptable
#![cfg_attr(
    test,
    allow(
        clippy::float_cmp,
        clippy::manual_let_else,
        clippy::unreadable_literal,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )
)]

/// Reconnect backoff policy and the single-slot retry timer.
pub mod backoff;

/// Error types.
pub mod error;

/// Change event types crossing the router.
pub mod event;

/// Per-subscription metrics snapshot.
pub mod metrics;

/// Event demultiplexing to caller handlers.
pub mod router;

/// Subscription specification and validation.
pub mod spec;

/// Connection state machine and transport status.
pub mod state;

/// Channel lifecycle supervision.
pub mod supervisor;

/// Testing utilities (mock transport, payload constructors).
pub mod testing;

/// Transport abstraction.
pub mod transport;

pub use backoff::BackoffPolicy;
pub use error::FeedError;
pub use event::{ChangeEvent, EventKind, TransportPayload};
pub use metrics::SubscriptionMetrics;
pub use router::{EventHandlers, SideEffectEmitter};
pub use spec::{ChannelIdPolicy, SubscriptionSpec};
pub use state::{ChannelStatus, ConnectionState};
pub use supervisor::{subscribe, SubscriptionHandle, SupervisorConfig};
pub use transport::{ChannelRequest, ChangeTransport, TransportSink};
