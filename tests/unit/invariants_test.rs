//! Data-model invariants (spec.md §8) exercised directly against the store,
//! independent of any `SessionManager`.

use liftsync::live_session::{SessionStatus, SqliteStore};
use liftsync::storage::Database;
use uuid::Uuid;

fn store() -> SqliteStore {
    SqliteStore::new(Database::open_in_memory().unwrap())
}

#[tokio::test]
async fn leader_invariant_breaks_if_leader_is_removed_without_reassignment() {
    let store = store();
    let host = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let session = store.create_session(host, None, None, 6).await.unwrap();
    store.add_participant(session.id, bob, "bob").await.unwrap();

    // Make bob leader, then remove him without electing a replacement: the
    // durable record no longer satisfies "leaderId in participantIds".
    store.set_leader(session.id, bob).await.unwrap();
    store.remove_participant(session.id, bob).await.unwrap();

    let refreshed = store.get_session(session.id, host).await.unwrap();
    assert!(!refreshed.leader_invariant_holds());
}

#[tokio::test]
async fn terminal_sessions_are_exempt_from_the_leader_invariant() {
    let store = store();
    let host = Uuid::new_v4();
    let session = store.create_session(host, None, None, 6).await.unwrap();
    store
        .update_status(session.id, SessionStatus::Completed, None, Some(chrono::Utc::now()))
        .await
        .unwrap();

    let refreshed = store.get_session(session.id, host).await.unwrap();
    assert!(refreshed.leader_invariant_holds());
}

#[tokio::test]
async fn remove_participant_is_idempotent() {
    let store = store();
    let host = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let session = store.create_session(host, None, None, 6).await.unwrap();
    store.add_participant(session.id, bob, "bob").await.unwrap();

    store.remove_participant(session.id, bob).await.unwrap();
    store.remove_participant(session.id, bob).await.unwrap();

    let refreshed = store.get_session(session.id, host).await.unwrap();
    assert!(!refreshed.participant_ids.contains(&bob));
}
