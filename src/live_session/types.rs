//! Data model shared by every live session component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifies a participant. An alias rather than a newtype, mirroring the
/// teacher's pervasive use of `Uuid` for rider ids.
pub type ParticipantId = Uuid;

/// Lifecycle state of a durable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal statuses reject any further mutation of the row.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// Strict mode gates set completion on a two-participant barrier; soft mode
/// is observability-only and is forced for 3+ participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Strict,
    Soft,
}

/// One exercise in the routine a session was created from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineExercise {
    pub name: String,
    pub sets: u32,
}

/// The durable session record. Server truth; mutated only through `Store`
/// writes and observed by peers via the change feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub host_id: ParticipantId,
    pub leader_id: ParticipantId,
    pub participant_ids: Vec<ParticipantId>,
    pub status: SessionStatus,
    pub invite_code: Option<String>,
    pub routine_data: Option<Vec<RoutineExercise>>,
    pub sync_mode: Option<SyncMode>,
    pub participant_heartbeats: HashMap<ParticipantId, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// `leaderId ∈ participantIds` whenever participants are non-empty and the
    /// session is non-terminal (invariant 1, spec.md §8).
    pub fn leader_invariant_holds(&self) -> bool {
        if self.participant_ids.is_empty() || self.status.is_terminal() {
            return true;
        }
        self.participant_ids.contains(&self.leader_id)
    }
}

/// A participant's live, in-progress workout status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutStatus {
    Lifting,
    Resting,
    Paused,
}

/// A single completed or in-progress set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRecord {
    pub kg: f32,
    pub reps: u32,
    pub completed: bool,
}

/// Per-exercise progress summary broadcast as part of `LiveUserState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSummary {
    pub name: String,
    pub completed_sets: u32,
    pub total_sets: u32,
    pub sets: Vec<SetRecord>,
}

/// Ephemeral, per-participant broadcast state. Owned by the originating
/// client; never durably stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveUserState {
    pub username: String,
    pub status: WorkoutStatus,
    pub current_exercise: Option<String>,
    pub current_set_index: u32,
    pub total_sets_in_exercise: u32,
    pub current_set_weight: f32,
    pub current_set_reps: u32,
    pub last_set_weight: f32,
    pub last_set_reps: u32,
    pub rest_time_remaining: Option<u32>,
    pub total_volume: f64,
    pub sets_completed: u32,
    pub exercise_count: u32,
    pub workout_duration: u64,
    pub exercise_summary: Vec<ExerciseSummary>,
}

/// A lightweight reaction, optionally aimed at a single participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Fire,
    Skull,
    Eyes,
    Hurry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub from_user_id: ParticipantId,
    pub target_user_id: Option<ParticipantId>,
    pub timestamp: DateTime<Utc>,
}

impl Reaction {
    /// Receiver-side targeting filter (§4.4.7, §9): deliver iff untargeted or
    /// aimed at `viewer`.
    pub fn visible_to(&self, viewer: ParticipantId) -> bool {
        self.target_user_id.map_or(true, |target| target == viewer)
    }
}

/// Set-completion and rest-barrier signalling consumed by the sync coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    SetCompleted {
        user_id: ParticipantId,
        exercise_idx: u32,
        set_idx: u32,
        rest_duration_secs: u32,
    },
    SyncRestStart {
        user_id: ParticipantId,
        started_at: DateTime<Utc>,
        duration_secs: u32,
    },
    ExerciseAdvanced {
        user_id: ParticipantId,
        exercise_idx: u32,
    },
}

/// In-process event derived from transport/store activity, delivered to local
/// UI subscribers via `SessionManager::subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined { user_id: ParticipantId },
    ParticipantLeft { user_id: ParticipantId },
    ParticipantFinished { user_id: ParticipantId },
    ParticipantKicked { user_id: ParticipantId },
    Kicked,
    LeaderChanged { user_id: ParticipantId },
}

/// Transport connection health, surfaced the same way `DiscoveryEvent`s are in
/// the teacher's presence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    Disconnected,
}

/// Notification kinds delivered out-of-session via the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    LiveInvite,
    LiveAccepted,
    JoinRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: ParticipantId,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted-state layout for reconnect-after-kill (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedWorkoutPointer {
    pub exercises: Vec<RoutineExercise>,
    pub start_timestamp: DateTime<Utc>,
    pub rest_duration_secs: u32,
    pub started_from_routine: bool,
    pub live_session_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_targeting_filters_by_receiver() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let broadcast = Reaction {
            kind: ReactionType::Fire,
            from_user_id: alice,
            target_user_id: None,
            timestamp: Utc::now(),
        };
        assert!(broadcast.visible_to(bob));

        let targeted = Reaction {
            kind: ReactionType::Hurry,
            from_user_id: alice,
            target_user_id: Some(bob),
            timestamp: Utc::now(),
        };
        assert!(targeted.visible_to(bob));
        assert!(!targeted.visible_to(alice));
    }

    #[test]
    fn terminal_status_exempts_leader_invariant() {
        let session = Session {
            id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            leader_id: Uuid::new_v4(),
            participant_ids: vec![],
            status: SessionStatus::Cancelled,
            invite_code: None,
            routine_data: None,
            sync_mode: None,
            participant_heartbeats: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        assert!(session.leader_invariant_holds());
    }
}
