//! Strict-mode set-completion barrier across two managers, including the
//! timeout fallback when one side never reports.

use std::time::Duration;

use liftsync::live_session::{SyncEvent, SyncMode, WireEvent};
use liftsync::storage::SessionSettings;

use super::support::World;

#[tokio::test]
async fn strict_barrier_resolves_once_both_participants_report() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let session_id = host
        .create_session(&[alice.local_user_id()], None, Some(SyncMode::Strict))
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();

    // Give the host's listener loop time to observe alice's join and update
    // its barrier's participant count before exercising it.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let topic = world.transport.join_topic(session_id);
    let mut rx = topic.subscribe_reliable();

    host.report_set_completed(0, 0, 120).unwrap();
    alice.report_set_completed(0, 0, 120).unwrap();

    let mut saw_rest_start = false;
    for _ in 0..4 {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(WireEvent::Sync {
                event: SyncEvent::SyncRestStart { duration_secs, .. },
            })) => {
                assert_eq!(duration_secs, 120);
                saw_rest_start = true;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_rest_start, "expected a sync_rest_start event once both reported");
}

#[tokio::test]
async fn strict_barrier_falls_back_after_timeout() {
    let settings = SessionSettings {
        strict_sync_timeout_ms: 50,
        ..SessionSettings::default()
    };
    let world = World::with_settings(settings);
    let host = world.manager("host");
    let alice = world.manager("alice");
    let session_id = host
        .create_session(&[alice.local_user_id()], None, Some(SyncMode::Strict))
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Only the host reports; alice never does, so the barrier must resolve
    // via the 50ms timeout fallback instead of waiting forever.
    host.report_set_completed(0, 0, 60).unwrap();

    let timed_out = tokio::time::timeout(Duration::from_millis(500), async {
        let topic = world.transport.join_topic(session_id);
        let mut rx = topic.subscribe_reliable();
        loop {
            if let Ok(WireEvent::Sync {
                event: SyncEvent::SyncRestStart { .. },
            }) = rx.recv().await
            {
                return;
            }
        }
    })
    .await;

    assert!(timed_out.is_ok(), "barrier should have resolved via timeout fallback");
}

#[tokio::test]
async fn barrier_resolves_when_the_only_holdout_leaves() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let session_id = host
        .create_session(&[alice.local_user_id()], None, Some(SyncMode::Strict))
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let topic = world.transport.join_topic(session_id);
    let mut rx = topic.subscribe_reliable();

    // Host reports and waits on alice; alice leaves instead of reporting,
    // which should close the barrier immediately rather than waiting for the
    // strict-sync timeout.
    host.report_set_completed(0, 0, 90).unwrap();
    alice.leave_session().await.unwrap();

    let mut saw_rest_start = false;
    for _ in 0..6 {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(WireEvent::Sync {
                event: SyncEvent::SyncRestStart { duration_secs, .. },
            })) => {
                assert_eq!(duration_secs, 90);
                saw_rest_start = true;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_rest_start, "expected the barrier to resolve once the holdout left");
}
