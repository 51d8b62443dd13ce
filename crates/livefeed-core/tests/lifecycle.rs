//! End-to-end subscription lifecycle tests against the mock transport.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use livefeed_core::testing::{delete_payload, insert_payload, MockTransport};
use livefeed_core::{
    subscribe, BackoffPolicy, ChangeEvent, ChannelStatus, ConnectionState, EventHandlers,
    EventKind, SubscriptionSpec, SupervisorConfig,
};

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct MaintenanceTask {
    id: u64,
    status: String,
}

/// Polls `cond` until it holds. Runs on the paused clock, so armed retry
/// timers fire while waiting.
async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not met within wait budget");
}

#[tokio::test(start_paused = true)]
async fn subscription_routes_events_and_fires_side_effects() {
    let transport = MockTransport::new();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let inserts = Arc::clone(&log);
    let deletes = Arc::clone(&log);
    let toasts = Arc::clone(&log);
    let handlers = EventHandlers::new()
        .on_insert(move |ev: &ChangeEvent<MaintenanceTask>| {
            let task = ev.new.as_ref().unwrap();
            inserts.lock().push(format!("insert {} ({})", task.id, task.status));
        })
        .on_delete(move |ev: &ChangeEvent<MaintenanceTask>| {
            deletes.lock().push(format!("delete {}", ev.old.as_ref().unwrap()["id"]));
        })
        .with_emitter(move |ev: &ChangeEvent<MaintenanceTask>| {
            toasts.lock().push(format!("toast {}", ev.kind));
        });

    let handle = subscribe(
        Arc::new(transport.clone()),
        SubscriptionSpec::table("maintenance_tasks")
            .with_events([EventKind::Insert, EventKind::Delete])
            .with_side_effects(true),
        SupervisorConfig::default(),
        handlers,
    )
    .unwrap();

    wait_until(|| transport.connect_count() == 1).await;
    transport.emit_status(ChannelStatus::Established);
    wait_until(|| handle.state() == ConnectionState::Established).await;

    transport.emit_payload(insert_payload(
        "maintenance_tasks",
        json!({"id": 42, "status": "scheduled"}),
    ));
    transport.emit_payload(delete_payload("maintenance_tasks", json!({"id": 17})));
    wait_until(|| handle.metrics().events_routed == 2).await;

    // The emitter fires after each handler, preserving dispatch order.
    assert_eq!(
        *log.lock(),
        vec![
            "insert 42 (scheduled)",
            "toast INSERT",
            "delete 17",
            "toast DELETE",
        ]
    );

    handle.close();
    wait_until(|| transport.disconnect_count() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_grow_until_the_budget_is_spent() {
    let transport = MockTransport::new();
    transport.fail_next_connects(10);

    let config = SupervisorConfig::default().with_backoff(BackoffPolicy::exponential(
        3,
        Duration::from_secs(1),
        Duration::from_secs(30),
    ));
    let handle = subscribe::<MaintenanceTask>(
        Arc::new(transport.clone()),
        SubscriptionSpec::table("maintenance_tasks").with_event(EventKind::Wildcard),
        config,
        EventHandlers::new(),
    )
    .unwrap();

    wait_until(|| transport.connect_count() == 1).await;
    let start = tokio::time::Instant::now();

    // Three budgeted retries at 1s, 2s, 4s of accumulated virtual time.
    wait_until(|| transport.connect_count() == 2).await;
    let first = start.elapsed();
    wait_until(|| transport.connect_count() == 3).await;
    let second = start.elapsed();
    wait_until(|| transport.connect_count() == 4).await;
    let third = start.elapsed();

    assert!(first >= Duration::from_secs(1) && first < Duration::from_millis(1200));
    assert!(second >= Duration::from_secs(3) && second < Duration::from_millis(3300));
    assert!(third >= Duration::from_secs(7) && third < Duration::from_millis(7500));

    // The fourth failure exhausts the budget. No further attempts.
    wait_until(|| handle.state() == ConnectionState::Exhausted).await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.connect_count(), 4);
    assert_eq!(handle.metrics().retries_scheduled, 3);
}

#[tokio::test(start_paused = true)]
async fn recovery_mid_budget_starts_the_next_outage_fresh() {
    let transport = MockTransport::new();
    let config = SupervisorConfig::default().with_backoff(BackoffPolicy::exponential(
        3,
        Duration::from_millis(100),
        Duration::from_secs(5),
    ));
    let handle = subscribe::<MaintenanceTask>(
        Arc::new(transport.clone()),
        SubscriptionSpec::table("maintenance_tasks").with_event(EventKind::Insert),
        config,
        EventHandlers::new(),
    )
    .unwrap();

    wait_until(|| transport.connect_count() == 1).await;
    transport.emit_status(ChannelStatus::Established);
    wait_until(|| handle.state() == ConnectionState::Established).await;

    // First outage burns two of three budgeted retries before recovering.
    transport.fail_next_connects(1);
    transport.emit_status(ChannelStatus::Error);
    wait_until(|| transport.connect_count() == 3).await;
    transport.emit_status(ChannelStatus::Established);
    wait_until(|| handle.metrics().consecutive_failures == 0).await;

    // The next outage gets the full budget again.
    transport.fail_next_connects(2);
    transport.emit_status(ChannelStatus::Error);
    wait_until(|| transport.connect_count() == 6).await;
    transport.emit_status(ChannelStatus::Established);
    wait_until(|| handle.state() == ConnectionState::Established).await;
    assert_ne!(handle.state(), ConnectionState::Exhausted);
}
