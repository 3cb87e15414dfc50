//! Finish protocol across two managers: one holdout keeps the session open,
//! force-end lets the waiting participant leave without completing it for
//! everyone else.

use liftsync::live_session::{finish, force_end, FinishOutcome, SessionHandle, SessionStatus};

use super::support::World;

#[tokio::test]
async fn finish_waits_for_the_holdout_then_completes() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let session_id = host
        .create_session(&[alice.local_user_id()], None, None)
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();

    let (outcome, _) = finish(&host, vec![]).await.unwrap();
    assert_eq!(outcome, FinishOutcome::Waiting);

    let still_active = world
        .store
        .get_session(session_id, alice.local_user_id())
        .await
        .unwrap();
    assert_eq!(still_active.status, SessionStatus::Active);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (outcome, summary) = finish(&alice, vec![]).await.unwrap();
    assert_eq!(outcome, FinishOutcome::AllDone);
    assert_eq!(summary.session_id, session_id);
}

#[tokio::test]
async fn force_end_does_not_complete_the_session_for_others() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let session_id = host
        .create_session(&[alice.local_user_id()], None, None)
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();

    force_end(&host, vec![]).await.unwrap();
    assert_eq!(host.handle(), SessionHandle::None);

    let refreshed = world
        .store
        .get_session(session_id, alice.local_user_id())
        .await
        .unwrap();
    assert_eq!(refreshed.status, SessionStatus::Active);
    assert!(refreshed.participant_ids.contains(&alice.local_user_id()));
}
