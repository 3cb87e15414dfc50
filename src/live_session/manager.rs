//! Session Manager (C4): the largest component. Owns a single active session
//! for the local user — state machine, membership, heartbeats, leader
//! election/transfer, kick, broadcasting, and reaction fan-out.
//!
//! Grounded on `networking/session.rs`'s `SessionManager`: the same
//! `Arc<RwLock<_>>` field shape, the same `broadcast::Sender<SessionEvent>`
//! snapshot-publish discipline, and the same `tokio::spawn` heartbeat/
//! disconnect-scan loop pattern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::live_session::presence::PresenceTracker;
use crate::live_session::store::{SqliteStore, StoreError};
use crate::live_session::sync_coordinator::SyncCoordinator;
use crate::live_session::transport::{StoreChangeEvent, StoreChangeKind, Transport, TopicHandle, WireEvent};
use crate::live_session::types::{
    ConnectionStatus, LiveUserState, NotificationType, ParticipantId, Reaction, ReactionType,
    RoutineExercise, Session, SessionEvent, SessionStatus, SyncEvent, SyncMode,
};
use crate::storage::config::SessionSettings;

const EVICTION_SCAN_INTERVAL: Duration = Duration::from_secs(20);

/// Nullable "current session" pointer, modelled explicitly as a sum type
/// (§9) rather than an optional id plus scattered booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHandle {
    None,
    Connecting(Uuid),
    Connected(Uuid),
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("already connected to a session")]
    AlreadyInSession,
    #[error("not currently in a session")]
    NotInSession,
    #[error("only the leader may perform this action")]
    NotLeader,
    #[error("session has ended")]
    SessionEnded,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct ActiveSession {
    session_id: Uuid,
    topic: TopicHandle,
    sync_coordinator: SyncCoordinator,
    heartbeat_task: JoinHandle<()>,
    eviction_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
    sync_forward_task: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.heartbeat_task.abort();
        self.eviction_task.abort();
        self.listener_task.abort();
        self.sync_forward_task.abort();
    }
}

pub struct SessionManager {
    local_user_id: ParticipantId,
    display_name: String,
    store: Arc<SqliteStore>,
    transport: Arc<dyn Transport>,
    presence: Arc<PresenceTracker>,
    settings: SessionSettings,

    handle: RwLock<SessionHandle>,
    active: Mutex<Option<ActiveSession>>,

    participant_states: Arc<RwLock<HashMap<ParticipantId, LiveUserState>>>,
    participant_finished: Arc<RwLock<HashMap<ParticipantId, bool>>>,
    connection_status: Arc<RwLock<ConnectionStatus>>,
    is_leader: Arc<AtomicBool>,
    leader_id: Arc<RwLock<Option<ParticipantId>>>,

    event_tx: broadcast::Sender<SessionEvent>,
    last_state_broadcast: Mutex<Option<Instant>>,
    last_targeted_reaction: Mutex<Option<Instant>>,
}

impl SessionManager {
    pub fn new(
        local_user_id: ParticipantId,
        display_name: impl Into<String>,
        store: Arc<SqliteStore>,
        transport: Arc<dyn Transport>,
        presence: Arc<PresenceTracker>,
        settings: SessionSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(128);
        Self {
            local_user_id,
            display_name: display_name.into(),
            store,
            transport,
            presence,
            settings,
            handle: RwLock::new(SessionHandle::None),
            active: Mutex::new(None),
            participant_states: Arc::new(RwLock::new(HashMap::new())),
            participant_finished: Arc::new(RwLock::new(HashMap::new())),
            connection_status: Arc::new(RwLock::new(
                ConnectionStatus::Disconnected,
            )),
            is_leader: Arc::new(AtomicBool::new(false)),
            leader_id: Arc::new(RwLock::new(None)),
            event_tx,
            last_state_broadcast: Mutex::new(None),
            last_targeted_reaction: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.read().unwrap().clone()
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub fn leader_id(&self) -> Option<ParticipantId> {
        *self.leader_id.read().unwrap()
    }

    pub fn participant_states(&self) -> HashMap<ParticipantId, LiveUserState> {
        self.participant_states.read().unwrap().clone()
    }

    pub fn participant_finished(&self) -> HashMap<ParticipantId, bool> {
        self.participant_finished.read().unwrap().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.connection_status.read().unwrap()
    }

    pub(crate) fn require_connected(&self) -> Result<Uuid, ManagerError> {
        match self.handle() {
            SessionHandle::Connected(id) => Ok(id),
            _ => Err(ManagerError::NotInSession),
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // ---- 4.4.1 Create & join -------------------------------------------------

    /// `createSession(friendIds, routineData?, syncMode?)` (§4.4.1).
    pub async fn create_session(
        &self,
        friend_ids: &[ParticipantId],
        routine_data: Option<Vec<RoutineExercise>>,
        sync_mode: Option<SyncMode>,
    ) -> Result<Uuid, ManagerError> {
        if !matches!(self.handle(), SessionHandle::None) {
            return Err(ManagerError::AlreadyInSession);
        }
        *self.handle.write().unwrap() = SessionHandle::Connecting(Uuid::nil());

        let session = self
            .store
            .create_session(
                self.local_user_id,
                routine_data,
                sync_mode,
                self.settings.invite_code_length,
            )
            .await?;

        self.enter_session(&session, true).await;

        for friend in friend_ids {
            let _ = self
                .store
                .create_notification(
                    *friend,
                    NotificationType::LiveInvite,
                    "Live workout invite",
                    &format!("{} invited you to a live session", self.display_name),
                    json!({ "sessionId": session.id, "hostName": self.display_name, "inviteCode": session.invite_code }),
                )
                .await;
        }

        tracing::info!(session_id = %session.id, "created live session");
        Ok(session.id)
    }

    /// `acceptInvite(sessionId)` / the shared accept path for invite, code
    /// redemption, and leader-approved join requests (§4.4.1).
    pub async fn accept_invite(
        &self,
        session_id: Uuid,
        user_id: ParticipantId,
        display_name: &str,
    ) -> Result<(), ManagerError> {
        if !matches!(self.handle(), SessionHandle::None) {
            return Err(ManagerError::AlreadyInSession);
        }
        self.store
            .add_participant(session_id, user_id, display_name)
            .await?;

        let session = self.store.get_session(session_id, user_id).await?;
        self.transport.publish_change(StoreChangeEvent {
            session_id,
            kind: StoreChangeKind::ParticipantAdded(user_id),
        });

        let is_leader = session.leader_id == self.local_user_id;
        self.enter_session(&session, is_leader).await;
        Ok(())
    }

    /// `reconnectToSession(sessionId)` (§4.4.2): verifies the session is
    /// non-terminal before rejoining.
    pub async fn reconnect_to_session(&self, session_id: Uuid) -> Result<Option<Session>, ManagerError> {
        let session = match self.store.get_session(session_id, self.local_user_id).await {
            Ok(s) => s,
            Err(StoreError::NotFound) | Err(StoreError::Forbidden) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if session.status.is_terminal() {
            return Ok(None);
        }
        let is_leader = session.leader_id == self.local_user_id;
        self.enter_session(&session, is_leader).await;
        Ok(Some(session))
    }

    /// Leader receives a `join_request` from a non-invited user and approves
    /// it, echoing `live_accepted` so the requester auto-joins (§4.4.1).
    pub async fn handle_join_request(
        &self,
        requester_id: ParticipantId,
        requester_name: &str,
    ) -> Result<(), ManagerError> {
        let session_id = self.require_connected()?;
        if !self.is_leader() {
            return Err(ManagerError::NotLeader);
        }
        self.store
            .add_participant(session_id, requester_id, requester_name)
            .await?;
        self.store
            .create_notification(
                requester_id,
                NotificationType::LiveAccepted,
                "Request accepted",
                "You've been added to the live session",
                json!({ "sessionId": session_id }),
            )
            .await?;
        self.transport.publish_change(StoreChangeEvent {
            session_id,
            kind: StoreChangeKind::ParticipantAdded(requester_id),
        });
        Ok(())
    }

    async fn enter_session(&self, session: &Session, is_leader: bool) {
        let topic = self.transport.join_topic(session.id);
        let (sync_coordinator, sync_rx) = SyncCoordinator::with_timeout(
            session.sync_mode,
            session.participant_ids.len().max(1),
            Duration::from_millis(self.settings.strict_sync_timeout_ms),
        );

        let heartbeat_task = self.spawn_heartbeat_loop(session.id);
        let eviction_task = self.spawn_eviction_loop(session.id);
        let listener_task = self.spawn_listener_loop(&topic, sync_coordinator.clone());
        let sync_forward_task = self.spawn_sync_forward_loop(topic.clone(), sync_rx);

        *self.active.lock().unwrap() = Some(ActiveSession {
            session_id: session.id,
            topic,
            sync_coordinator,
            heartbeat_task,
            eviction_task,
            listener_task,
            sync_forward_task,
        });
        *self.handle.write().unwrap() = SessionHandle::Connected(session.id);
        self.is_leader.store(is_leader, Ordering::SeqCst);
        *self.leader_id.write().unwrap() = Some(session.leader_id);
        *self.connection_status.write().unwrap() =
            ConnectionStatus::Connected;
        self.presence
            .set_present(self.local_user_id, true, Some(session.id));
    }

    fn spawn_heartbeat_loop(&self, session_id: Uuid) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let user_id = self.local_user_id;
        let interval_ms = self.settings.heartbeat_interval_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                if let Err(err) = store.write_heartbeat(session_id, user_id).await {
                    tracing::warn!(%err, "failed to write heartbeat");
                }
            }
        })
    }

    fn spawn_eviction_loop(&self, session_id: Uuid) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let participant_states = Arc::clone(&self.participant_states);
        let participant_finished = Arc::clone(&self.participant_finished);
        let event_tx = self.event_tx.clone();
        let eviction_timeout_ms = self.settings.eviction_timeout_ms;
        let local_user_id = self.local_user_id;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_SCAN_INTERVAL);
            loop {
                ticker.tick().await;
                let session = match store.get_session(session_id, local_user_id).await {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                let now = Utc::now();
                let threshold = chrono::Duration::milliseconds(eviction_timeout_ms as i64);

                for (user_id, last_seen) in &session.participant_heartbeats {
                    if *user_id == local_user_id {
                        continue;
                    }
                    if now.signed_duration_since(*last_seen) > threshold {
                        let had_entry = participant_states.write().unwrap().remove(user_id).is_some();
                        participant_finished.write().unwrap().remove(user_id);
                        if had_entry {
                            tracing::warn!(%user_id, "heartbeat stale, treating as participant_left");
                            let _ = event_tx.send(SessionEvent::ParticipantLeft { user_id: *user_id });
                        }

                        // Last-writer-wins leader re-election: if the stale
                        // user was the leader and remaining participants
                        // exist, the lexicographically smallest remaining id
                        // claims leadership (§4.4.5, §9).
                        if session.leader_id == *user_id {
                            let mut remaining: Vec<ParticipantId> = session
                                .participant_ids
                                .iter()
                                .copied()
                                .filter(|id| id != user_id)
                                .collect();
                            remaining.sort();
                            if let Some(&smallest) = remaining.first() {
                                if smallest == local_user_id {
                                    let _ = store.set_leader(session_id, local_user_id).await;
                                }
                            } else {
                                let _ = store
                                    .update_status(session_id, SessionStatus::Cancelled, None, Some(Utc::now()))
                                    .await;
                            }
                        }
                    }
                }
            }
        })
    }

    fn spawn_listener_loop(&self, topic: &TopicHandle, sync_coordinator: SyncCoordinator) -> JoinHandle<()> {
        let mut state_rx = topic.subscribe_state();
        let mut reliable_rx = topic.subscribe_reliable();
        let mut changes_rx = self.transport.subscribe_changes();
        let participant_states = Arc::clone(&self.participant_states);
        let participant_finished = Arc::clone(&self.participant_finished);
        let event_tx = self.event_tx.clone();
        let local_user_id = self.local_user_id;
        let is_leader = Arc::clone(&self.is_leader);
        let leader_store = Arc::clone(&self.leader_id);
        let store = Arc::clone(&self.store);
        let session_id = topic.session_id;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok(event) = state_rx.recv() => {
                        if let WireEvent::State { user_id, state } = event {
                            if user_id != local_user_id {
                                participant_states.write().unwrap().insert(user_id, state);
                            }
                        }
                    }
                    Ok(event) = reliable_rx.recv() => {
                        match event {
                            WireEvent::Kick { target_user_id } if target_user_id == local_user_id => {
                                let _ = event_tx.send(SessionEvent::Kicked);
                            }
                            WireEvent::Kick { target_user_id } => {
                                participant_states.write().unwrap().remove(&target_user_id);
                                let _ = event_tx.send(SessionEvent::ParticipantKicked { user_id: target_user_id });
                            }
                            WireEvent::Finished { user_id } => {
                                participant_finished.write().unwrap().insert(user_id, true);
                                let _ = event_tx.send(SessionEvent::ParticipantFinished { user_id });

                                if is_leader.load(Ordering::SeqCst) {
                                    let known = store
                                        .get_session(session_id, local_user_id)
                                        .await
                                        .map(|s| s.participant_ids)
                                        .unwrap_or_else(|_| vec![local_user_id]);
                                    let all_done = {
                                        let finished = participant_finished.read().unwrap();
                                        known.iter().all(|id| finished.get(id).copied().unwrap_or(false))
                                    };
                                    if all_done {
                                        let _ = store
                                            .update_status(session_id, SessionStatus::Completed, None, Some(Utc::now()))
                                            .await;
                                    }
                                }
                            }
                            WireEvent::Sync {
                                event:
                                    SyncEvent::SetCompleted {
                                        user_id,
                                        exercise_idx,
                                        set_idx,
                                        rest_duration_secs,
                                    },
                            } if user_id != local_user_id => {
                                sync_coordinator.report_set_completed(user_id, exercise_idx, set_idx, rest_duration_secs);
                            }
                            WireEvent::Reaction { .. } | WireEvent::Sync { .. } | WireEvent::State { .. } => {}
                        }
                    }
                    Ok(change) = changes_rx.recv() => {
                        match change.kind {
                            StoreChangeKind::LeaderChanged(new_leader) => {
                                *leader_store.write().unwrap() = Some(new_leader);
                                is_leader.store(new_leader == local_user_id, Ordering::SeqCst);
                                let _ = event_tx.send(SessionEvent::LeaderChanged { user_id: new_leader });
                            }
                            StoreChangeKind::ParticipantAdded(user_id) => {
                                if let Ok(s) = store.get_session(session_id, local_user_id).await {
                                    sync_coordinator.set_participant_count(s.participant_ids.len().max(1));
                                }
                                let _ = event_tx.send(SessionEvent::ParticipantJoined { user_id });
                            }
                            StoreChangeKind::ParticipantRemoved(user_id) => {
                                participant_states.write().unwrap().remove(&user_id);
                                participant_finished.write().unwrap().remove(&user_id);
                                sync_coordinator.participant_left(user_id);
                                let _ = event_tx.send(SessionEvent::ParticipantLeft { user_id });
                            }
                            StoreChangeKind::StatusChanged(_) => {}
                        }
                    }
                    else => break,
                }
            }
        })
    }

    /// Relays the sync coordinator's barrier resolution onto the wire. Only
    /// `SyncRestStart` is forwarded here: `SetCompleted`/`ExerciseAdvanced`
    /// are already broadcast directly by their call sites, so re-sending
    /// them from the coordinator's own channel would duplicate them.
    fn spawn_sync_forward_loop(&self, topic: TopicHandle, mut sync_rx: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            while let Ok(event) = sync_rx.recv().await {
                if matches!(event, SyncEvent::SyncRestStart { .. }) {
                    transport.broadcast(&topic, WireEvent::Sync { event });
                }
            }
        })
    }

    // ---- 4.4.4 Broadcasting local state ---------------------------------

    /// Computes at most 5 Hz (coalesce consecutive updates), per §4.4.4/§5.
    pub fn broadcast_state(&self, state: LiveUserState) -> Result<(), ManagerError> {
        let active = self.active.lock().unwrap();
        let active = active.as_ref().ok_or(ManagerError::NotInSession)?;

        let min_interval = Duration::from_millis(1000 / self.settings.broadcast_rate_hz.max(1) as u64);
        let mut last = self.last_state_broadcast.lock().unwrap();
        if let Some(prev) = *last {
            if prev.elapsed() < min_interval {
                return Ok(());
            }
        }
        *last = Some(Instant::now());
        drop(last);

        self.transport.broadcast(
            &active.topic,
            WireEvent::State {
                user_id: self.local_user_id,
                state,
            },
        );
        Ok(())
    }

    // ---- 4.4.5 Leader role -------------------------------------------------

    pub async fn kick_participant(&self, user_id: ParticipantId) -> Result<(), ManagerError> {
        let session_id = self.require_connected()?;
        if !self.is_leader() {
            return Err(ManagerError::NotLeader);
        }
        self.store.remove_participant(session_id, user_id).await?;

        let active = self.active.lock().unwrap();
        if let Some(active) = active.as_ref() {
            self.transport.broadcast(
                &active.topic,
                WireEvent::Kick {
                    target_user_id: user_id,
                },
            );
        }
        drop(active);
        self.transport.publish_change(StoreChangeEvent {
            session_id,
            kind: StoreChangeKind::ParticipantRemoved(user_id),
        });
        Ok(())
    }

    pub async fn transfer_leadership(&self, user_id: ParticipantId) -> Result<(), ManagerError> {
        let session_id = self.require_connected()?;
        self.store.set_leader(session_id, user_id).await?;
        self.transport.publish_change(StoreChangeEvent {
            session_id,
            kind: StoreChangeKind::LeaderChanged(user_id),
        });
        self.is_leader.store(user_id == self.local_user_id, Ordering::SeqCst);
        *self.leader_id.write().unwrap() = Some(user_id);
        Ok(())
    }

    // ---- 4.4.7 Reactions ----------------------------------------------------

    pub fn send_reaction(
        &self,
        kind: ReactionType,
        target_user_id: Option<ParticipantId>,
    ) -> Result<(), ManagerError> {
        let active = self.active.lock().unwrap();
        let active = active.as_ref().ok_or(ManagerError::NotInSession)?;

        if target_user_id.is_some() {
            let mut last = self.last_targeted_reaction.lock().unwrap();
            if let Some(prev) = *last {
                if prev.elapsed() < Duration::from_secs(1) {
                    return Ok(());
                }
            }
            *last = Some(Instant::now());
        }

        self.transport.broadcast(
            &active.topic,
            WireEvent::Reaction {
                reaction: Reaction {
                    kind,
                    from_user_id: self.local_user_id,
                    target_user_id,
                    timestamp: Utc::now(),
                },
            },
        );
        Ok(())
    }

    // ---- 4.5 Sync coordinator passthrough -----------------------------------

    pub fn report_set_completed(&self, exercise_idx: u32, set_idx: u32, rest_duration_secs: u32) -> Result<(), ManagerError> {
        let active = self.active.lock().unwrap();
        let active = active.as_ref().ok_or(ManagerError::NotInSession)?;
        active
            .sync_coordinator
            .report_set_completed(self.local_user_id, exercise_idx, set_idx, rest_duration_secs);
        self.transport.broadcast(
            &active.topic,
            WireEvent::Sync {
                event: SyncEvent::SetCompleted {
                    user_id: self.local_user_id,
                    exercise_idx,
                    set_idx,
                    rest_duration_secs,
                },
            },
        );
        Ok(())
    }

    pub fn exercise_advanced(&self, exercise_idx: u32) -> Result<(), ManagerError> {
        let active = self.active.lock().unwrap();
        let active = active.as_ref().ok_or(ManagerError::NotInSession)?;
        active.sync_coordinator.exercise_advanced(self.local_user_id, exercise_idx);
        self.transport.broadcast(
            &active.topic,
            WireEvent::Sync {
                event: SyncEvent::ExerciseAdvanced {
                    user_id: self.local_user_id,
                    exercise_idx,
                },
            },
        );
        Ok(())
    }

    // ---- leave / finish passthrough ------------------------------------------

    pub async fn leave_session(&self) -> Result<(), ManagerError> {
        let session_id = self.require_connected()?;
        self.store.remove_participant(session_id, self.local_user_id).await?;
        self.transport.publish_change(StoreChangeEvent {
            session_id,
            kind: StoreChangeKind::ParticipantRemoved(self.local_user_id),
        });
        self.clear_local_state();
        Ok(())
    }

    pub(crate) fn clear_local_state(&self) {
        *self.active.lock().unwrap() = None;
        *self.handle.write().unwrap() = SessionHandle::None;
        self.participant_states.write().unwrap().clear();
        self.participant_finished.write().unwrap().clear();
        self.is_leader.store(false, Ordering::SeqCst);
        *self.leader_id.write().unwrap() = None;
        *self.connection_status.write().unwrap() =
            ConnectionStatus::Disconnected;
    }

    pub fn local_user_id(&self) -> ParticipantId {
        self.local_user_id
    }

    pub(crate) fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub(crate) fn participant_finished_map(&self) -> Arc<RwLock<HashMap<ParticipantId, bool>>> {
        Arc::clone(&self.participant_finished)
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    pub(crate) fn active_topic(&self) -> Option<TopicHandle> {
        self.active.lock().unwrap().as_ref().map(|a| a.topic.clone())
    }

    pub(crate) fn session_id_opt(&self) -> Option<Uuid> {
        self.active.lock().unwrap().as_ref().map(|a| a.session_id)
    }
}
