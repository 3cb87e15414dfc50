//! Sync Coordinator (C5): the optional set-completion barrier.
//!
//! The strict-mode 60s timeout uses the same `tokio::time` + atomic-flag idiom
//! as `racing::countdown::CountdownSync`: a spawned delay task fires
//! `sync_rest_start` if the barrier hasn't resolved naturally, and is
//! cancelled on early resolution. Soft mode is the "send and don't wait" shape
//! of `MetricSync::broadcast_metrics`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::live_session::types::{ParticipantId, SyncEvent, SyncMode};

/// Strict mode's barrier timeout (§4.5, §7).
pub const STRICT_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

struct Inner {
    participant_count: AtomicUsize,
    requested_mode: Option<SyncMode>,
    current_exercise_idx: AtomicU32,
    done: Mutex<HashSet<ParticipantId>>,
    /// The participant whose set-completion opened the current barrier; its
    /// `restDuration` is the one used for `sync_rest_start` (originator
    /// chooses, per the design notes' resolved open question).
    origin: Mutex<Option<ParticipantId>>,
    /// Most recently reported rest duration, used to resolve the barrier when
    /// it closes via a participant leaving rather than via a report.
    last_rest_duration: AtomicU32,
    event_tx: broadcast::Sender<SyncEvent>,
    timeout_handle: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

/// Optional barrier over set-completion events. One instance per active
/// session.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Uses the default 60s strict-sync timeout (§4.5, §7).
    pub fn new(requested_mode: Option<SyncMode>, participant_count: usize) -> (Self, broadcast::Receiver<SyncEvent>) {
        Self::with_timeout(requested_mode, participant_count, STRICT_SYNC_TIMEOUT)
    }

    /// Same as [`Self::new`] but with an explicit barrier timeout, driven by
    /// `SessionSettings::strict_sync_timeout_ms` in production.
    pub fn with_timeout(
        requested_mode: Option<SyncMode>,
        participant_count: usize,
        timeout: Duration,
    ) -> (Self, broadcast::Receiver<SyncEvent>) {
        let (event_tx, rx) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            participant_count: AtomicUsize::new(participant_count),
            requested_mode,
            current_exercise_idx: AtomicU32::new(0),
            done: Mutex::new(HashSet::new()),
            origin: Mutex::new(None),
            last_rest_duration: AtomicU32::new(0),
            event_tx,
            timeout_handle: Mutex::new(None),
            timeout,
        });
        (Self { inner }, rx)
    }

    /// Soft is forced for 3+ participants regardless of the requested mode;
    /// strict only applies for exactly two (§4.5).
    pub fn effective_mode(&self) -> SyncMode {
        if self.inner.participant_count.load(Ordering::SeqCst) >= 3 {
            SyncMode::Soft
        } else {
            self.inner.requested_mode.unwrap_or(SyncMode::Soft)
        }
    }

    pub fn set_participant_count(&self, count: usize) {
        self.inner.participant_count.store(count, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    /// A participant completed the current set. Always broadcasts for
    /// observability; in strict mode this also advances the barrier.
    pub fn report_set_completed(&self, user_id: ParticipantId, exercise_idx: u32, set_idx: u32, rest_duration_secs: u32) {
        let _ = self.inner.event_tx.send(SyncEvent::SetCompleted {
            user_id,
            exercise_idx,
            set_idx,
            rest_duration_secs,
        });
        self.inner.last_rest_duration.store(rest_duration_secs, Ordering::SeqCst);

        if self.effective_mode() != SyncMode::Strict {
            return;
        }

        let should_spawn_timer = {
            let mut done = self.inner.done.lock().unwrap();
            let was_empty = done.is_empty();
            done.insert(user_id);
            if was_empty {
                *self.inner.origin.lock().unwrap() = Some(user_id);
            }
            was_empty
        };

        if self.barrier_satisfied() {
            self.resolve(rest_duration_secs, false);
            return;
        }

        if should_spawn_timer {
            self.spawn_timeout(rest_duration_secs);
        }
    }

    /// A participant leaving counts as "done" for barrier purposes (§4.5 edge
    /// policy a): shrinks the expected count and, if that's what the open
    /// barrier was waiting on, resolves it using the most recently reported
    /// rest duration.
    pub fn participant_left(&self, user_id: ParticipantId) {
        let _ = self
            .inner
            .participant_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1).max(1))
            });

        if self.effective_mode() != SyncMode::Strict {
            return;
        }
        self.inner.done.lock().unwrap().insert(user_id);
        if self.barrier_satisfied() {
            let rest_duration_secs = self.inner.last_rest_duration.load(Ordering::SeqCst);
            self.resolve(rest_duration_secs, false);
        }
    }

    /// Advancing exercise resets barrier state and clears `setDone` (§4.5
    /// edge policy b).
    pub fn exercise_advanced(&self, user_id: ParticipantId, exercise_idx: u32) {
        self.inner.current_exercise_idx.store(exercise_idx, Ordering::SeqCst);
        self.inner.done.lock().unwrap().clear();
        self.cancel_timeout();
        let _ = self
            .inner
            .event_tx
            .send(SyncEvent::ExerciseAdvanced { user_id, exercise_idx });
    }

    fn barrier_satisfied(&self) -> bool {
        let done = self.inner.done.lock().unwrap();
        done.len() >= self.inner.participant_count.load(Ordering::SeqCst)
    }

    fn spawn_timeout(&self, rest_duration_secs: u32) {
        let inner = Arc::clone(&self.inner);
        let coordinator = SyncCoordinator { inner: Arc::clone(&self.inner) };
        let timeout = self.inner.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let still_open = inner.done.lock().unwrap().len() < inner.participant_count.load(Ordering::SeqCst);
            if still_open {
                tracing::warn!(?timeout, "strict sync barrier timed out, starting rest anyway");
                coordinator.resolve(rest_duration_secs, true);
            }
        });
        *self.inner.timeout_handle.lock().unwrap() = Some(handle);
    }

    fn cancel_timeout(&self) {
        if let Some(handle) = self.inner.timeout_handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn resolve(&self, rest_duration_secs: u32, via_timeout: bool) {
        self.cancel_timeout();
        self.inner.done.lock().unwrap().clear();
        let origin = self.inner.origin.lock().unwrap().take().unwrap_or(ParticipantId::nil());
        if via_timeout {
            tracing::info!("sync_rest_start emitted via timeout fallback");
        } else {
            tracing::debug!("sync_rest_start emitted, barrier satisfied naturally");
        }
        let _ = self.inner.event_tx.send(SyncEvent::SyncRestStart {
            user_id: origin,
            started_at: chrono::Utc::now(),
            duration_secs: rest_duration_secs,
        });
    }
}
