//! Integration tests for snapshot bootstrap, incremental sync, and resync.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};

use whosonline_core::AppError;
use whosonline_core::config::client::RetryConfig;
use whosonline_core::types::UserId;
use whosonline_realtime::PRESENCE_CHANNEL;
use whosonline_realtime::PresenceTracker;
use whosonline_realtime::presence::tracker::ResyncOutcome;
use whosonline_realtime::presence::{ChangeCause, SyncState};
use whosonline_realtime::sync::RetryPolicy;

use helpers::{
    FlakyBus, ScriptedSource, TestTracker, going_offline, going_online, ids, snapshot,
};

#[tokio::test]
async fn test_end_to_end_gap_resync() {
    let t = TestTracker::new(ScriptedSource::new().then_ok(snapshot(&[2, 4], 200)));
    let mut changes = t.tracker.subscribe_changes();

    t.tracker.bootstrap(snapshot(&[1, 2], 100)).await.unwrap();

    t.deliver(101, going_online(3));
    t.deliver(103, going_online(5));
    t.drain().await;

    assert_eq!(t.ids().await, ids(&[2, 4]));
    assert_eq!(t.tracker.last_sequence().await, Some(200));
    assert_eq!(t.tracker.resync_count(), 1);
    assert_eq!(t.source.calls(), 1);

    let bootstrap = changes.try_recv().unwrap();
    assert_eq!(bootstrap.cause, ChangeCause::Bootstrap);
    assert_eq!(bootstrap.user_ids, ids(&[1, 2]));

    let push = changes.try_recv().unwrap();
    assert_eq!(push.cause, ChangeCause::Push);
    assert_eq!(push.user_ids, ids(&[3]));

    let resync = changes.try_recv().unwrap();
    assert_eq!(resync.cause, ChangeCause::Resync);
    assert_eq!(resync.user_ids, ids(&[1, 3, 4]));

    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_contiguous_messages_apply_in_order() {
    let t = TestTracker::new(ScriptedSource::new());
    t.tracker.bootstrap(snapshot(&[1], 10)).await.unwrap();

    t.deliver(11, going_online(2));
    t.deliver(12, going_online(3));
    t.deliver(13, going_offline(&[1, 3]));
    t.deliver(14, going_offline(&[99]));
    t.drain().await;

    assert_eq!(t.ids().await, ids(&[2]));
    assert_eq!(t.tracker.last_sequence().await, Some(14));
    assert_eq!(t.tracker.resync_count(), 0);
    assert_eq!(t.source.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_going_online_keeps_one_entry() {
    let t = TestTracker::new(ScriptedSource::new());
    t.tracker.bootstrap(snapshot(&[1], 0)).await.unwrap();

    t.deliver(1, going_online(1));
    t.deliver(2, going_online(1));
    t.drain().await;

    assert_eq!(t.tracker.online_count().await, 1);
    let users = t.tracker.online_users().await;
    assert_eq!(users[0].username, "user1");
}

#[tokio::test]
async fn test_gap_of_any_size_resyncs_once() {
    for jump in [2, 7, 1_000] {
        let t = TestTracker::new(ScriptedSource::new().then_ok(snapshot(&[8], 5_000)));
        t.tracker.bootstrap(snapshot(&[1], 10)).await.unwrap();

        t.deliver(10 + jump, going_online(2));
        // Covered by the fresh snapshot, so the bus drops them.
        t.deliver(11 + jump, going_online(3));
        t.deliver(12 + jump, going_online(4));
        t.drain().await;

        assert_eq!(t.tracker.resync_count(), 1, "jump {jump}");
        assert_eq!(t.source.calls(), 1, "jump {jump}");
        assert_eq!(t.ids().await, ids(&[8]), "jump {jump}");
    }
}

#[tokio::test]
async fn test_no_stale_positives_after_resync() {
    let t = TestTracker::new(ScriptedSource::new().then_ok(snapshot(&[3], 50)));
    t.tracker.bootstrap(snapshot(&[1, 2, 3], 10)).await.unwrap();

    t.tracker.resync().await.unwrap();

    assert!(!t.tracker.is_online(UserId(1)).await);
    assert!(!t.tracker.is_online(UserId(2)).await);
    assert!(t.tracker.is_online(UserId(3)).await);
}

#[tokio::test]
async fn test_resync_resubscribes_at_snapshot_position() {
    let t = TestTracker::new(ScriptedSource::new().then_ok(snapshot(&[1], 300)));
    t.tracker.bootstrap(snapshot(&[], 10)).await.unwrap();

    t.deliver(20, going_online(9));
    t.deliver(301, going_online(2));
    t.drain().await;

    assert_eq!(t.ids().await, ids(&[1, 2]));
    assert_eq!(t.tracker.last_sequence().await, Some(301));
    assert_eq!(t.tracker.state().await, SyncState::Synced);
}

#[tokio::test]
async fn test_resync_failure_keeps_last_good_state() {
    let t = TestTracker::new(
        ScriptedSource::new().then_err(AppError::external_service("connection refused")),
    );
    t.tracker.bootstrap(snapshot(&[1, 2], 10)).await.unwrap();

    let frame = whosonline_realtime::message::BusEnvelope::on_channel(
        PRESENCE_CHANNEL,
        12,
        going_online(3),
    );
    let result = t.tracker.handle_envelope(frame).await;

    assert!(result.is_err());
    assert_eq!(t.ids().await, ids(&[1, 2]));
    assert_eq!(t.tracker.last_sequence().await, Some(10));
    assert_eq!(t.tracker.state().await, SyncState::Synced);
    assert_eq!(t.tracker.resync_count(), 0);
    assert_eq!(t.bus.position(PRESENCE_CHANNEL), Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_resync_retries_transient_failures() {
    let retry = RetryPolicy::from_config(&RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 250,
        multiplier: 2.0,
        max_delay_ms: 1_000,
    });
    let source = ScriptedSource::new()
        .then_err(AppError::service_unavailable("503"))
        .then_err(AppError::external_service("reset"))
        .then_ok(snapshot(&[7], 90));
    let t = TestTracker::with_retry(source, retry);
    t.tracker.bootstrap(snapshot(&[1], 10)).await.unwrap();

    let outcome = t.tracker.resync().await.unwrap();

    assert_eq!(
        outcome,
        ResyncOutcome::Applied {
            changed: ids(&[1, 7])
        }
    );
    assert_eq!(t.source.calls(), 3);
    assert_eq!(t.ids().await, ids(&[7]));
}

#[tokio::test]
async fn test_superseded_resync_is_discarded() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::new()
        .then_gated(gate.clone(), snapshot(&[1, 2, 3], 40))
        .then_ok(snapshot(&[9], 60));
    let t = TestTracker::new(source);
    t.tracker.bootstrap(snapshot(&[1], 10)).await.unwrap();

    let slow = {
        let tracker = t.tracker.clone();
        tokio::spawn(async move { tracker.resync().await })
    };
    while t.source.calls() < 1 {
        tokio::task::yield_now().await;
    }

    let fresh = t.tracker.resync().await.unwrap();
    assert_eq!(
        fresh,
        ResyncOutcome::Applied {
            changed: ids(&[1, 9])
        }
    );

    gate.notify_one();
    let stale = slow.await.unwrap().unwrap();
    assert_eq!(stale, ResyncOutcome::Superseded);

    assert_eq!(t.ids().await, ids(&[9]));
    assert_eq!(t.tracker.last_sequence().await, Some(60));
    assert_eq!(t.tracker.resync_count(), 1);
}

#[tokio::test]
async fn test_unknown_message_type_ignored() {
    let t = TestTracker::new(ScriptedSource::new());
    t.tracker.bootstrap(snapshot(&[1], 10)).await.unwrap();

    t.deliver(11, serde_json::json!({ "message_type": "going_sideways" }));
    t.deliver(12, serde_json::json!({ "message_type": "going_online" }));
    t.deliver(13, going_online(2));
    t.drain().await;

    assert_eq!(t.ids().await, ids(&[1, 2]));
    assert_eq!(t.tracker.last_sequence().await, Some(13));
    assert_eq!(t.tracker.resync_count(), 0);
}

#[tokio::test]
async fn test_messages_before_snapshot_ignored() {
    let t = TestTracker::new(ScriptedSource::new());
    let frame =
        whosonline_realtime::message::BusEnvelope::on_channel(PRESENCE_CHANNEL, 1, going_online(1));

    t.tracker.handle_envelope(frame).await.unwrap();

    assert_eq!(t.tracker.state().await, SyncState::Uninitialized);
    assert_eq!(t.tracker.online_count().await, 0);
}

#[tokio::test]
async fn test_foreign_channel_ignored() {
    let t = TestTracker::new(ScriptedSource::new());
    t.tracker.bootstrap(snapshot(&[], 0)).await.unwrap();
    let frame = whosonline_realtime::message::BusEnvelope::on_channel(
        "/notification/1",
        99,
        going_online(1),
    );

    t.tracker.handle_envelope(frame).await.unwrap();

    assert_eq!(t.tracker.online_count().await, 0);
    assert_eq!(t.tracker.last_sequence().await, Some(0));
}

#[tokio::test]
async fn test_start_fetches_initial_snapshot() {
    let t = TestTracker::new(ScriptedSource::new().then_ok(snapshot(&[4, 5], 77)));

    t.tracker.start().await.unwrap();
    // Already synced: no second fetch.
    t.tracker.start().await.unwrap();

    assert_eq!(t.source.calls(), 1);
    assert_eq!(t.ids().await, ids(&[4, 5]));
    assert_eq!(t.bus.position(PRESENCE_CHANNEL), Some(77));
    assert_eq!(t.tracker.state().await, SyncState::Synced);
}

#[tokio::test]
async fn test_shutdown_releases_subscription() {
    let t = TestTracker::new(ScriptedSource::new());
    t.tracker.bootstrap(snapshot(&[1], 0)).await.unwrap();
    assert!(t.bus.is_subscribed(PRESENCE_CHANNEL));

    let (tx, rx) = watch::channel(false);
    let runner = {
        let tracker = t.tracker.clone();
        tokio::spawn(async move { tracker.run(rx).await })
    };

    t.deliver(1, going_online(2));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !t.tracker.is_online(UserId(2)).await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    runner.await.unwrap().unwrap();

    assert!(!t.bus.is_subscribed(PRESENCE_CHANNEL));
    assert!(t.tracker.is_online(UserId(1)).await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_resubscribe_notifies_and_recovers() {
    let source = Arc::new(
        ScriptedSource::new()
            .then_ok(snapshot(&[2, 4], 50))
            .then_ok(snapshot(&[2, 4], 60)),
    );
    let bus = Arc::new(FlakyBus::default());
    let tracker = Arc::new(PresenceTracker::new(
        source.clone(),
        bus.clone(),
        RetryPolicy::none(),
    ));
    tracker.bootstrap(snapshot(&[1, 2], 10)).await.unwrap();
    let mut changes = tracker.subscribe_changes();
    bus.fail_next_subscribes(1);

    assert!(tracker.resync().await.is_err());

    assert!(tracker.is_online(UserId(4)).await);
    assert!(!tracker.is_online(UserId(1)).await);
    assert_eq!(tracker.resync_count(), 1);
    assert_eq!(tracker.state().await, SyncState::Resyncing);
    assert!(!bus.inner.is_subscribed(PRESENCE_CHANNEL));
    let event = changes.try_recv().unwrap();
    assert_eq!(event.cause, ChangeCause::Resync);
    assert_eq!(event.user_ids, ids(&[1, 4]));

    let (tx, rx) = watch::channel(false);
    let runner = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.run(rx).await })
    };
    tokio::time::timeout(Duration::from_secs(30), async {
        while tracker.state().await != SyncState::Synced {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(source.calls(), 2);
    assert_eq!(tracker.resync_count(), 2);
    assert_eq!(bus.inner.position(PRESENCE_CHANNEL), Some(60));
    // Membership did not move between the two snapshots.
    assert!(changes.try_recv().is_err());

    tx.send(true).unwrap();
    runner.await.unwrap().unwrap();
    assert!(!bus.inner.is_subscribed(PRESENCE_CHANNEL));
}

#[tokio::test(start_paused = true)]
async fn test_receive_errors_back_off() {
    let bus = Arc::new(FlakyBus::default());
    let tracker = Arc::new(PresenceTracker::new(
        Arc::new(ScriptedSource::new()),
        bus.clone(),
        RetryPolicy::none(),
    ));
    tracker.bootstrap(snapshot(&[1], 0)).await.unwrap();
    bus.fail_receives(true);

    let (tx, rx) = watch::channel(false);
    let runner = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.run(rx).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(true).unwrap();
    runner.await.unwrap().unwrap();

    let receives = bus.receives();
    assert!((2..=6).contains(&receives), "receives {receives}");
    assert!(tracker.is_online(UserId(1)).await);
}

