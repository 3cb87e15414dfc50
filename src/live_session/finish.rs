//! Finish Protocol (C7): per-participant `finished` flag, "waiting for all"
//! aggregation, force-end escape hatch, and session summary (§4.7).

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::live_session::manager::{ManagerError, SessionManager};
use crate::live_session::transport::WireEvent;
use crate::live_session::types::{ExerciseSummary, ParticipantId, SessionStatus};

/// Aggregate of every participant's last-known `exerciseSummary`, computed
/// in-memory at the moment finish or force-end is invoked.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub exercises_by_participant: HashMap<ParticipantId, Vec<ExerciseSummary>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// All known participants have reported finished; the leader has (or
    /// will, on its own evaluation) advance the session to `completed`.
    AllDone,
    /// At least one participant is still active; the caller should show a
    /// waiting overlay.
    Waiting,
}

/// `endLiveSession(summary)` step 1-4 (§4.7): marks the local user finished,
/// broadcasts it, and evaluates whether every known participant is done.
pub async fn finish(
    manager: &SessionManager,
    local_exercises: Vec<ExerciseSummary>,
) -> Result<(FinishOutcome, SessionSummary), ManagerError> {
    let session_id = manager.require_connected()?;
    let local_user_id = manager.local_user_id();

    manager
        .participant_finished_map()
        .write()
        .unwrap()
        .insert(local_user_id, true);

    if let Some(topic) = manager.active_topic() {
        manager.transport().broadcast(
            &topic,
            WireEvent::Finished {
                user_id: local_user_id,
            },
        );
    }

    let summary = build_summary(manager, session_id, &local_exercises);
    let all_done = all_participants_finished(manager, session_id).await;

    if all_done && manager.is_leader() {
        manager
            .store()
            .update_status(session_id, SessionStatus::Completed, None, Some(Utc::now()))
            .await?;
    }

    let outcome = if all_done {
        FinishOutcome::AllDone
    } else {
        FinishOutcome::Waiting
    };
    Ok((outcome, summary))
}

/// `forceEndSession` (§4.7 step 5): the waiting participant leaves locally
/// without marking the session `completed`; everyone else continues.
pub async fn force_end(
    manager: &SessionManager,
    local_exercises: Vec<ExerciseSummary>,
) -> Result<SessionSummary, ManagerError> {
    let session_id = manager.require_connected()?;
    let summary = build_summary(manager, session_id, &local_exercises);
    manager.leave_session().await?;
    Ok(summary)
}

fn build_summary(
    manager: &SessionManager,
    session_id: Uuid,
    local_exercises: &[ExerciseSummary],
) -> SessionSummary {
    let mut exercises_by_participant: HashMap<ParticipantId, Vec<ExerciseSummary>> = manager
        .participant_states()
        .into_iter()
        .map(|(user_id, state)| (user_id, state.exercise_summary))
        .collect();
    exercises_by_participant.insert(manager.local_user_id(), local_exercises.to_vec());

    SessionSummary {
        session_id,
        exercises_by_participant,
    }
}

/// Every participant the durable session roster lists must have reported
/// `finished` for the barrier to be satisfied. Falls back to "self only" if
/// the roster can't be fetched (store error), matching the solo-session
/// case.
pub(crate) async fn all_participants_finished(manager: &SessionManager, session_id: Uuid) -> bool {
    let known: Vec<ParticipantId> = manager
        .store()
        .get_session(session_id, manager.local_user_id())
        .await
        .map(|s| s.participant_ids)
        .unwrap_or_else(|_| vec![manager.local_user_id()]);
    let finished = manager.participant_finished();
    known
        .iter()
        .all(|id| finished.get(id).copied().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_session::presence::PresenceTracker;
    use crate::live_session::store::SqliteStore;
    use crate::live_session::transport::InProcessTransport;
    use crate::live_session::transport::Transport;
    use crate::storage::config::SessionSettings;
    use crate::storage::Database;
    use std::sync::Arc;

    fn manager(store: &Arc<SqliteStore>, transport: &Arc<dyn Transport>, presence: &Arc<PresenceTracker>) -> SessionManager {
        SessionManager::new(
            Uuid::new_v4(),
            "tester",
            Arc::clone(store),
            Arc::clone(transport),
            Arc::clone(presence),
            SessionSettings::default(),
        )
    }

    #[tokio::test]
    async fn solo_session_finishes_immediately() {
        let store = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
        let presence = Arc::new(PresenceTracker::new());
        let host = manager(&store, &transport, &presence);
        host.create_session(&[], None, None).await.unwrap();

        let (outcome, summary) = finish(&host, vec![]).await.unwrap();
        assert_eq!(outcome, FinishOutcome::AllDone);
        assert!(summary.exercises_by_participant.contains_key(&host.local_user_id()));
    }

    #[tokio::test]
    async fn force_end_leaves_without_completing_session() {
        let store = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
        let presence = Arc::new(PresenceTracker::new());
        let host = manager(&store, &transport, &presence);
        let session_id = host.create_session(&[], None, None).await.unwrap();

        let bob = manager(&store, &transport, &presence);
        bob.accept_invite(session_id, bob.local_user_id(), "bob")
            .await
            .unwrap();

        force_end(&host, vec![]).await.unwrap();
        assert!(matches!(host.handle(), crate::live_session::manager::SessionHandle::None));

        let refreshed = store.get_session(session_id, bob.local_user_id()).await.unwrap();
        assert_eq!(refreshed.status, crate::live_session::types::SessionStatus::Active);
    }
}
