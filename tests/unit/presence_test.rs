//! Presence tracker behaviour independent of any live session.

use liftsync::live_session::{PresenceEvent, PresenceTracker};
use uuid::Uuid;

#[tokio::test]
async fn set_present_emits_an_updated_event_to_subscribers() {
    let tracker = PresenceTracker::new();
    let mut events = tracker.subscribe();
    let user = Uuid::new_v4();

    tracker.set_present(user, true, None);

    let event = events.recv().await.unwrap();
    match event {
        PresenceEvent::Updated { user_id, entry } => {
            assert_eq!(user_id, user);
            assert!(entry.working_out);
        }
        other => panic!("expected Updated, got {other:?}"),
    }
}

#[tokio::test]
async fn set_offline_emits_a_removed_event() {
    let tracker = PresenceTracker::new();
    let user = Uuid::new_v4();
    tracker.set_present(user, false, None);
    let mut events = tracker.subscribe();

    tracker.set_offline(user);

    let event = events.recv().await.unwrap();
    assert!(matches!(event, PresenceEvent::Removed { user_id } if user_id == user));
}
