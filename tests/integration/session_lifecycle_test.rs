//! Create/invite/accept, reaction targeting, leadership transfer, and kick,
//! exercised across independent `SessionManager` instances sharing one
//! store and transport.

use liftsync::live_session::{ManagerError, ReactionType, SessionHandle};

use super::support::World;

#[tokio::test]
async fn create_invite_accept_brings_everyone_into_the_same_session() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let bob = world.manager("bob");

    let session_id = host
        .create_session(&[alice.local_user_id(), bob.local_user_id()], None, None)
        .await
        .unwrap();

    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();
    bob.accept_invite(session_id, bob.local_user_id(), "bob")
        .await
        .unwrap();

    assert_eq!(host.handle(), SessionHandle::Connected(session_id));
    assert_eq!(alice.handle(), SessionHandle::Connected(session_id));
    assert_eq!(bob.handle(), SessionHandle::Connected(session_id));
    assert!(host.is_leader());
    assert!(!alice.is_leader());
}

#[tokio::test]
async fn targeted_reactions_are_not_visible_to_the_wrong_receiver() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let bob = world.manager("bob");
    let session_id = host
        .create_session(&[alice.local_user_id(), bob.local_user_id()], None, None)
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();
    bob.accept_invite(session_id, bob.local_user_id(), "bob")
        .await
        .unwrap();

    let topic = world.transport.join_topic(session_id);
    let mut rx = topic.subscribe_reliable();

    host.send_reaction(ReactionType::Hurry, Some(alice.local_user_id()))
        .unwrap();

    let event = rx.recv().await.unwrap();
    match event {
        liftsync::live_session::WireEvent::Reaction { reaction } => {
            assert!(!reaction.visible_to(bob.local_user_id()));
            assert!(reaction.visible_to(alice.local_user_id()));
        }
        other => panic!("expected a reaction event, got {other:?}"),
    }
}

#[tokio::test]
async fn leader_transfer_then_leave_hands_off_cleanly() {
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

    host.transfer_leadership(alice.local_user_id()).await.unwrap();
    assert!(alice.is_leader());
    assert!(!host.is_leader());

    host.leave_session().await.unwrap();
    assert_eq!(host.handle(), SessionHandle::None);

    let refreshed = world
        .store
        .get_session(session_id, alice.local_user_id())
        .await
        .unwrap();
    assert!(!refreshed.participant_ids.contains(&host.local_user_id()));
}

#[tokio::test]
async fn only_the_leader_may_kick() {
    let world = World::new();
    let host = world.manager("host");
    let alice = world.manager("alice");
    let bob = world.manager("bob");
    let session_id = host
        .create_session(&[alice.local_user_id(), bob.local_user_id()], None, None)
        .await
        .unwrap();
    alice
        .accept_invite(session_id, alice.local_user_id(), "alice")
        .await
        .unwrap();
    bob.accept_invite(session_id, bob.local_user_id(), "bob")
        .await
        .unwrap();

    let err = alice.kick_participant(bob.local_user_id()).await.unwrap_err();
    assert!(matches!(err, ManagerError::NotLeader));

    host.kick_participant(bob.local_user_id()).await.unwrap();
    let refreshed = world
        .store
        .get_session(session_id, alice.local_user_id())
        .await
        .unwrap();
    assert!(!refreshed.participant_ids.contains(&bob.local_user_id()));
}
