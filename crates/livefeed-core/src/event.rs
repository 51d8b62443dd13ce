//! Change event types.
//!
//! Two tiers of types cross the manager:
//!
//! - [`TransportPayload`] — the raw notification as delivered by the
//!   transport, rows still untyped JSON.
//! - [`ChangeEvent`] — the typed notification handed to exactly one caller
//!   handler by the router. Produced once per payload, never buffered,
//!   never retained beyond the handler invocation.

use serde_json::Value;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Discriminant for row-level change event kinds.
///
/// `Wildcard` is only meaningful in a [`SubscriptionSpec`](crate::spec::SubscriptionSpec)
/// event set or a wildcard handler registration; a routed
/// [`ChangeEvent`] always carries a concrete kind.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new row was inserted.
    Insert = 0,
    /// An existing row was updated.
    Update = 1,
    /// A row was deleted.
    Delete = 2,
    /// All of the above (subscription filter only).
    Wildcard = 3,
}

impl EventKind {
    /// Returns the wire name of this kind as used by the transport filter.
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Wildcard => "*",
        }
    }

    /// Parses a wire event name. Returns `None` for names this manager
    /// does not know — the transport may deliver kinds beyond the filter
    /// in edge cases, and those are dropped by the router, not errors.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "*" => Some(Self::Wildcard),
            _ => None,
        }
    }

    /// Returns `true` for the wildcard pseudo-kind.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// TransportPayload
// ---------------------------------------------------------------------------

/// A raw change notification as delivered by the transport.
///
/// Row values are untyped JSON at this layer; the router deserializes the
/// new row into the caller's type during dispatch.
#[derive(Debug, Clone)]
pub struct TransportPayload {
    /// Wire event name (`INSERT`, `UPDATE`, `DELETE`).
    pub event: String,
    /// Schema namespace of the source table.
    pub schema: String,
    /// Logical table name.
    pub table: String,
    /// New row value. Present for inserts and updates.
    pub record: Option<Value>,
    /// Old row value. Present for updates and deletes, may be partial.
    pub old_record: Option<Value>,
    /// Commit timestamp in milliseconds since epoch.
    pub commit_timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// A typed change notification, routed to at most one handler.
///
/// `new` is decoded into the caller's row type. `old` stays untyped
/// because the transport may deliver a partial old row (e.g. only the
/// primary key) that cannot honor `T`'s schema.
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    /// The concrete event kind (never `Wildcard`).
    pub kind: EventKind,
    /// Logical table name the change occurred on.
    pub table: String,
    /// New row value. `Some` for inserts and updates.
    pub new: Option<T>,
    /// Old row value. `Some` for updates and deletes, possibly partial.
    pub old: Option<Value>,
    /// Commit timestamp in milliseconds since epoch.
    pub commit_timestamp_ms: i64,
}
