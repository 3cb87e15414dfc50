//! Per-session topic transport (C1).
//!
//! Grounded on `networking/sync.rs`'s `MetricSync` (broadcast channel fan-out,
//! `subscribe()` returning a `broadcast::Receiver`) and `networking/protocol.rs`'s
//! tagged wire enum — translated from bincode-over-UDP to a `serde_json`-tagged
//! enum over an in-process `tokio::sync::broadcast` channel per session topic,
//! since the spec calls for JSON "versioned by key presence" (§6) rather than a
//! binary framed protocol.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::live_session::types::{LiveUserState, ParticipantId, Reaction, SessionStatus, SyncEvent};

/// Capacity of the lossy per-topic state channel. Once a sender is more than
/// this many messages behind, tokio's broadcast ring buffer silently drops
/// the oldest entries — exactly the "coalesce to latest state, drop
/// intermediate ones" behaviour §5 asks for.
const STATE_CHANNEL_CAPACITY: usize = 8;

/// Capacity of the channel carrying events that must never be dropped
/// (reactions, sync barrier signalling, kicks).
const RELIABLE_CHANNEL_CAPACITY: usize = 256;

/// Tagged wire event for a session topic. JSON, versioned by key presence
/// (the `type` tag) rather than an explicit schema version field (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    State {
        user_id: ParticipantId,
        state: LiveUserState,
    },
    Reaction {
        reaction: Reaction,
    },
    Sync {
        event: SyncEvent,
    },
    Kick {
        target_user_id: ParticipantId,
    },
    Finished {
        user_id: ParticipantId,
    },
}

/// A durable row-level change observed through the store's change feed.
#[derive(Debug, Clone)]
pub struct StoreChangeEvent {
    pub session_id: Uuid,
    pub kind: StoreChangeKind,
}

#[derive(Debug, Clone)]
pub enum StoreChangeKind {
    StatusChanged(SessionStatus),
    LeaderChanged(ParticipantId),
    ParticipantAdded(ParticipantId),
    ParticipantRemoved(ParticipantId),
}

/// A joined topic: one lossy channel for `state`, one reliable channel for
/// `reaction`/`sync`/`kick`.
#[derive(Clone)]
pub struct TopicHandle {
    pub session_id: Uuid,
    state_tx: broadcast::Sender<WireEvent>,
    reliable_tx: broadcast::Sender<WireEvent>,
}

impl TopicHandle {
    pub fn subscribe_state(&self) -> broadcast::Receiver<WireEvent> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_reliable(&self) -> broadcast::Receiver<WireEvent> {
        self.reliable_tx.subscribe()
    }
}

struct TopicChannels {
    state_tx: broadcast::Sender<WireEvent>,
    reliable_tx: broadcast::Sender<WireEvent>,
}

/// Authenticated channel primitive (C1): per-session topic broadcast plus an
/// ordered change feed, standing in for the spec's postgres change-feed +
/// realtime topic pairing.
pub trait Transport: Send + Sync {
    fn join_topic(&self, session_id: Uuid) -> TopicHandle;
    fn broadcast(&self, topic: &TopicHandle, event: WireEvent);
    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChangeEvent>;
    fn publish_change(&self, event: StoreChangeEvent);
}

/// In-process `Transport` implementation: every simulated client lives in the
/// same process, so the "network" is a set of broadcast channels keyed by
/// session id.
pub struct InProcessTransport {
    topics: RwLock<HashMap<Uuid, TopicChannels>>,
    changes_tx: broadcast::Sender<StoreChangeEvent>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(RELIABLE_CHANNEL_CAPACITY);
        Self {
            topics: RwLock::new(HashMap::new()),
            changes_tx,
        }
    }
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InProcessTransport {
    fn join_topic(&self, session_id: Uuid) -> TopicHandle {
        let mut topics = self.topics.write().unwrap();
        let channels = topics.entry(session_id).or_insert_with(|| {
            let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
            let (reliable_tx, _) = broadcast::channel(RELIABLE_CHANNEL_CAPACITY);
            TopicChannels {
                state_tx,
                reliable_tx,
            }
        });

        TopicHandle {
            session_id,
            state_tx: channels.state_tx.clone(),
            reliable_tx: channels.reliable_tx.clone(),
        }
    }

    fn broadcast(&self, topic: &TopicHandle, event: WireEvent) {
        let result = match &event {
            WireEvent::State { .. } => topic.state_tx.send(event),
            WireEvent::Reaction { .. }
            | WireEvent::Sync { .. }
            | WireEvent::Kick { .. }
            | WireEvent::Finished { .. } => topic.reliable_tx.send(event),
        };
        if let Err(err) = result {
            tracing::debug!(session_id = %topic.session_id, "broadcast had no subscribers: {err}");
        }
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChangeEvent> {
        self.changes_tx.subscribe()
    }

    fn publish_change(&self, event: StoreChangeEvent) {
        let _ = self.changes_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_session::types::{ReactionType, WorkoutStatus};
    use chrono::Utc;

    fn sample_state() -> LiveUserState {
        LiveUserState {
            username: "alice".into(),
            status: WorkoutStatus::Lifting,
            current_exercise: Some("Squat".into()),
            current_set_index: 0,
            total_sets_in_exercise: 3,
            current_set_weight: 60.0,
            current_set_reps: 5,
            last_set_weight: 0.0,
            last_set_reps: 0,
            rest_time_remaining: None,
            total_volume: 0.0,
            sets_completed: 0,
            exercise_count: 1,
            workout_duration: 0,
            exercise_summary: Vec::new(),
        }
    }

    #[tokio::test]
    async fn reactions_are_never_dropped_even_under_state_pressure() {
        let transport = InProcessTransport::new();
        let session_id = Uuid::new_v4();
        let topic = transport.join_topic(session_id);
        let mut reliable_rx = topic.subscribe_reliable();

        let reaction = Reaction {
            kind: ReactionType::Fire,
            from_user_id: Uuid::new_v4(),
            target_user_id: None,
            timestamp: Utc::now(),
        };
        transport.broadcast(&topic, WireEvent::Reaction { reaction });

        let received = reliable_rx.recv().await.unwrap();
        assert!(matches!(received, WireEvent::Reaction { .. }));
    }

    #[tokio::test]
    async fn state_channel_coalesces_under_backpressure() {
        let transport = InProcessTransport::new();
        let session_id = Uuid::new_v4();
        let topic = transport.join_topic(session_id);
        let mut state_rx = topic.subscribe_state();

        for _ in 0..(STATE_CHANNEL_CAPACITY * 2) {
            transport.broadcast(
                &topic,
                WireEvent::State {
                    user_id: Uuid::new_v4(),
                    state: sample_state(),
                },
            );
        }

        // The lagging receiver should observe a gap rather than every message.
        let mut observed = 0;
        loop {
            match state_rx.try_recv() {
                Ok(_) => observed += 1,
                Err(_) => break,
            }
        }
        assert!(observed <= STATE_CHANNEL_CAPACITY);
    }
}
