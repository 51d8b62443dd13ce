//! Event routing.
//!
//! The router demultiplexes raw transport payloads by event kind and
//! invokes the single matching caller handler, synchronously, in
//! delivery order. A payload whose kind matches no handler is a no-op,
//! not an error. Handler panics are caught and logged; they never poison
//! the subscription.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::de::DeserializeOwned;

use crate::event::{ChangeEvent, EventKind, TransportPayload};
use crate::state::ConnectionState;

/// A per-kind change handler.
pub type Handler<T> = Box<dyn Fn(&ChangeEvent<T>) + Send + Sync>;

/// A connection-state observer.
pub type StateHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;

// ---------------------------------------------------------------------------
// SideEffectEmitter
// ---------------------------------------------------------------------------

/// Optional side-effect emitter, e.g. a user-facing notification toast.
///
/// When the subscription enables side effects, the emitter receives the
/// same [`ChangeEvent`] the handler received, at most once, after the
/// handler returns. Events that invoke no handler never reach the
/// emitter.
pub trait SideEffectEmitter<T>: Send + Sync {
    /// Emits the side effect for one routed event.
    fn emit(&self, event: &ChangeEvent<T>);
}

impl<T, F> SideEffectEmitter<T> for F
where
    F: Fn(&ChangeEvent<T>) + Send + Sync,
{
    fn emit(&self, event: &ChangeEvent<T>) {
        self(event);
    }
}

// ---------------------------------------------------------------------------
// EventHandlers
// ---------------------------------------------------------------------------

/// Caller-supplied callback set for one subscription.
///
/// ```rust,ignore
/// let handlers = EventHandlers::new()
///     .on_insert(|ev| println!("new row in {}", ev.table))
///     .on_delete(|ev| println!("row gone from {}", ev.table))
///     .on_state(|state| println!("channel is {state}"));
/// ```
pub struct EventHandlers<T> {
    on_insert: Option<Handler<T>>,
    on_update: Option<Handler<T>>,
    on_delete: Option<Handler<T>>,
    on_any: Option<Handler<T>>,
    on_state: Option<StateHandler>,
    emitter: Option<Box<dyn SideEffectEmitter<T>>>,
}

impl<T> Default for EventHandlers<T> {
    fn default() -> Self {
        Self {
            on_insert: None,
            on_update: None,
            on_delete: None,
            on_any: None,
            on_state: None,
            emitter: None,
        }
    }
}

impl<T> EventHandlers<T> {
    /// Creates an empty handler set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the insert handler.
    #[must_use]
    pub fn on_insert<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChangeEvent<T>) + Send + Sync + 'static,
    {
        self.on_insert = Some(Box::new(f));
        self
    }

    /// Registers the update handler.
    #[must_use]
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChangeEvent<T>) + Send + Sync + 'static,
    {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Registers the delete handler.
    #[must_use]
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChangeEvent<T>) + Send + Sync + 'static,
    {
        self.on_delete = Some(Box::new(f));
        self
    }

    /// Registers a wildcard handler, invoked for any kind that has no
    /// specific handler. A specific handler always wins; at most one
    /// handler runs per event.
    #[must_use]
    pub fn on_any<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChangeEvent<T>) + Send + Sync + 'static,
    {
        self.on_any = Some(Box::new(f));
        self
    }

    /// Registers a connection-state observer, invoked on every state
    /// change (e.g. to render "reconnecting…").
    #[must_use]
    pub fn on_state<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.on_state = Some(Box::new(f));
        self
    }

    /// Attaches a side-effect emitter. It only fires when the
    /// subscription spec enables side effects.
    #[must_use]
    pub fn with_emitter<E>(mut self, emitter: E) -> Self
    where
        E: SideEffectEmitter<T> + 'static,
    {
        self.emitter = Some(Box::new(emitter));
        self
    }

    fn handler_for(&self, kind: EventKind) -> Option<&Handler<T>> {
        let specific = match kind {
            EventKind::Insert => self.on_insert.as_ref(),
            EventKind::Update => self.on_update.as_ref(),
            EventKind::Delete => self.on_delete.as_ref(),
            EventKind::Wildcard => None,
        };
        specific.or(self.on_any.as_ref())
    }
}

// ---------------------------------------------------------------------------
// EventRouter
// ---------------------------------------------------------------------------

/// Outcome of routing one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
    /// A handler was invoked.
    Routed,
    /// No handler matched or the payload was undecodable; dropped.
    Ignored,
    /// A handler was invoked and panicked; the panic was contained.
    HandlerPanicked,
}

/// Routes raw payloads to the caller's handlers for one subscription.
pub struct EventRouter<T> {
    handlers: EventHandlers<T>,
    emit_side_effects: bool,
}

impl<T: DeserializeOwned> EventRouter<T> {
    /// Creates a router over the given handler set.
    pub(crate) fn new(handlers: EventHandlers<T>, emit_side_effects: bool) -> Self {
        Self {
            handlers,
            emit_side_effects,
        }
    }

    /// Routes one payload: resolves its kind, decodes the row, and
    /// invokes at most one handler. Runs synchronously on the calling
    /// task, preserving transport delivery order.
    pub(crate) fn route(&self, payload: TransportPayload) -> RouteOutcome {
        let Some(kind) = EventKind::from_wire(&payload.event) else {
            tracing::debug!(event = %payload.event, table = %payload.table, "dropping payload with unknown event kind");
            return RouteOutcome::Ignored;
        };
        if kind.is_wildcard() {
            // The transport delivers concrete kinds; a literal '*' payload
            // is malformed.
            tracing::debug!(table = %payload.table, "dropping wildcard payload");
            return RouteOutcome::Ignored;
        }
        let Some(handler) = self.handlers.handler_for(kind) else {
            tracing::trace!(kind = %kind, table = %payload.table, "no handler registered for kind");
            return RouteOutcome::Ignored;
        };

        let event = match decode::<T>(kind, payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(kind = %kind, error = %err, "dropping undecodable payload");
                return RouteOutcome::Ignored;
            }
        };

        if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
            tracing::warn!(kind = %kind, table = %event.table, "change handler panicked");
            return RouteOutcome::HandlerPanicked;
        }

        if self.emit_side_effects {
            if let Some(emitter) = self.handlers.emitter.as_ref() {
                if catch_unwind(AssertUnwindSafe(|| emitter.emit(&event))).is_err() {
                    tracing::warn!(kind = %kind, table = %event.table, "side-effect emitter panicked");
                }
            }
        }

        RouteOutcome::Routed
    }

    /// Notifies the state observer, if one is registered.
    pub(crate) fn notify_state(&self, state: ConnectionState) {
        if let Some(on_state) = self.handlers.on_state.as_ref() {
            if catch_unwind(AssertUnwindSafe(|| on_state(state))).is_err() {
                tracing::warn!(state = %state, "state observer panicked");
            }
        }
    }
}

/// Decodes a payload into a typed change event.
fn decode<T: DeserializeOwned>(
    kind: EventKind,
    payload: TransportPayload,
) -> Result<ChangeEvent<T>, serde_json::Error> {
    let new = match payload.record {
        Some(value) => Some(serde_json::from_value(value)?),
        None => None,
    };
    Ok(ChangeEvent {
        kind,
        table: payload.table,
        new,
        old: payload.old_record,
        commit_timestamp_ms: payload.commit_timestamp_ms,
    })
}
