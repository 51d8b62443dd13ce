//! Subscription descriptors.
//!
//! A [`SubscriptionSpec`] is the immutable description of what one call
//! site wants to watch: table, schema, event kinds, optional row filter.
//! It is created once per call site and validated when the subscription
//! is opened.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FeedError;
use crate::event::EventKind;

/// Default schema namespace when none is given.
pub const DEFAULT_SCHEMA: &str = "public";

// Process-wide counter so channel names never collide at the transport.
static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// ChannelIdPolicy
// ---------------------------------------------------------------------------

/// Whether the channel name stays stable across reconnect attempts.
///
/// A stable name helps server-side dedup across retries; a fresh name per
/// attempt avoids stale server-side channel state. Neither is mandated by
/// the transport, so the choice is a per-subscription policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelIdPolicy {
    /// Mint the channel name once at open and reuse it for every attempt.
    Stable,
    /// Mint a fresh channel name for every connect attempt.
    #[default]
    PerAttempt,
}

// ---------------------------------------------------------------------------
// SubscriptionSpec
// ---------------------------------------------------------------------------

/// Immutable descriptor of one subscription.
///
/// Built with `with_*` methods:
///
/// ```rust,ignore
/// let spec = SubscriptionSpec::table("maintenance_tasks")
///     .with_events([EventKind::Insert, EventKind::Update])
///     .with_filter("equipment_id=eq.42")
///     .with_side_effects(true);
/// ```
#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    table: String,
    schema: String,
    events: Vec<EventKind>,
    filter: Option<String>,
    emit_side_effects: bool,
}

impl SubscriptionSpec {
    /// Creates a spec for the given table with the default schema and an
    /// empty event set. At least one event kind must be added before the
    /// spec passes validation.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            events: Vec::new(),
            filter: None,
            emit_side_effects: false,
        }
    }

    /// Sets the schema namespace.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Adds one event kind to watch.
    #[must_use]
    pub fn with_event(mut self, kind: EventKind) -> Self {
        if !self.events.contains(&kind) {
            self.events.push(kind);
        }
        self
    }

    /// Adds several event kinds to watch.
    #[must_use]
    pub fn with_events(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        for kind in kinds {
            self = self.with_event(kind);
        }
        self
    }

    /// Sets an optional row filter expression. The syntax is
    /// transport-specific and opaque to the manager.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enables or disables the side-effect emitter for this subscription.
    #[must_use]
    pub fn with_side_effects(mut self, enabled: bool) -> Self {
        self.emit_side_effects = enabled;
        self
    }

    /// Returns the target table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the schema namespace.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the requested event kinds.
    #[must_use]
    pub fn events(&self) -> &[EventKind] {
        &self.events
    }

    /// Returns the row filter expression, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Returns `true` if routed events should also reach the side-effect
    /// emitter.
    #[must_use]
    pub fn emit_side_effects(&self) -> bool {
        self.emit_side_effects
    }

    /// Returns `true` if this spec watches the given kind, either
    /// directly or via `Wildcard`.
    #[must_use]
    pub fn watches(&self, kind: EventKind) -> bool {
        self.events
            .iter()
            .any(|e| e.is_wildcard() || *e == kind)
    }

    /// Validates the spec. Configuration errors are local and
    /// non-retryable; they are reported synchronously at open time.
    ///
    /// # Errors
    ///
    /// [`FeedError::EmptyTableName`] if the table name is empty,
    /// [`FeedError::NoEventKinds`] if no event kinds are requested.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.table.trim().is_empty() {
            return Err(FeedError::EmptyTableName);
        }
        if self.events.is_empty() {
            return Err(FeedError::NoEventKinds);
        }
        Ok(())
    }

    /// Mints a process-unique channel name for this spec.
    #[must_use]
    pub fn mint_channel_name(&self) -> String {
        let seq = CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}:{}", self.schema, self.table, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_spec_defaults() {
        let spec = SubscriptionSpec::table("equipment");
        assert_eq!(spec.table_name(), "equipment");
        assert_eq!(spec.schema(), DEFAULT_SCHEMA);
        assert!(spec.events().is_empty());
        assert!(spec.filter().is_none());
        assert!(!spec.emit_side_effects());
    }

    #[test]
    fn test_spec_builder() {
        let spec = SubscriptionSpec::table("maintenance_tasks")
            .with_schema("farm")
            .with_events([EventKind::Insert, EventKind::Update])
            .with_filter("status=eq.scheduled")
            .with_side_effects(true);

        assert_eq!(spec.schema(), "farm");
        assert_eq!(spec.events(), &[EventKind::Insert, EventKind::Update]);
        assert_eq!(spec.filter(), Some("status=eq.scheduled"));
        assert!(spec.emit_side_effects());
    }

    #[test]
    fn test_spec_deduplicates_events() {
        let spec = SubscriptionSpec::table("parts")
            .with_event(EventKind::Insert)
            .with_event(EventKind::Insert);
        assert_eq!(spec.events().len(), 1);
    }

    #[test]
    fn test_spec_watches() {
        let spec = SubscriptionSpec::table("parts").with_event(EventKind::Insert);
        assert!(spec.watches(EventKind::Insert));
        assert!(!spec.watches(EventKind::Delete));

        let all = SubscriptionSpec::table("parts").with_event(EventKind::Wildcard);
        assert!(all.watches(EventKind::Insert));
        assert!(all.watches(EventKind::Update));
        assert!(all.watches(EventKind::Delete));
    }

    #[test]
    fn test_spec_validation() {
        let ok = SubscriptionSpec::table("equipment").with_event(EventKind::Insert);
        assert!(ok.validate().is_ok());

        let empty_table = SubscriptionSpec::table("").with_event(EventKind::Insert);
        assert!(matches!(
            empty_table.validate(),
            Err(FeedError::EmptyTableName)
        ));

        let blank_table = SubscriptionSpec::table("   ").with_event(EventKind::Insert);
        assert!(matches!(
            blank_table.validate(),
            Err(FeedError::EmptyTableName)
        ));

        let no_events = SubscriptionSpec::table("equipment");
        assert!(matches!(no_events.validate(), Err(FeedError::NoEventKinds)));
    }

    #[test]
    fn test_channel_names_unique() {
        let spec = SubscriptionSpec::table("equipment").with_event(EventKind::Insert);
        let names: HashSet<String> = (0..100).map(|_| spec.mint_channel_name()).collect();
        assert_eq!(names.len(), 100);
        assert!(names.iter().all(|n| n.starts_with("public:equipment:")));
    }

    #[test]
    fn test_channel_id_policy_default() {
        assert_eq!(ChannelIdPolicy::default(), ChannelIdPolicy::PerAttempt);
    }
}
