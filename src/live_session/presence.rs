//! Presence tracker (C3): process-wide online/working-out status, independent
//! of any single live session.
//!
//! Grounded on `networking/discovery.rs`'s peer-map-plus-broadcast shape,
//! minus the mDNS transport (the spec's presence topic is an authenticated
//! channel, not LAN discovery).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Default server-side presence timeout before a user is considered offline,
/// tolerating brief backgrounding without flicker (§4.3).
pub const PRESENCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEntry {
    pub working_out: bool,
    pub live_session_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Updated {
        user_id: Uuid,
        entry: PresenceEntry,
    },
    Removed {
        user_id: Uuid,
    },
}

struct TrackedPresence {
    entry: PresenceEntry,
    last_seen: Instant,
}

/// Single long-lived service object, constructed once by the app root and
/// handed to whichever managers need it (§9: "re-express module-level
/// singletons as explicit service objects").
pub struct PresenceTracker {
    users: RwLock<HashMap<Uuid, TrackedPresence>>,
    events: broadcast::Sender<PresenceEvent>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            users: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Mark a user present, updating their `working_out`/`live_session_id` state.
    pub fn set_present(&self, user_id: Uuid, working_out: bool, live_session_id: Option<Uuid>) {
        let entry = PresenceEntry {
            working_out,
            live_session_id,
        };
        self.users.write().unwrap().insert(
            user_id,
            TrackedPresence {
                entry,
                last_seen: Instant::now(),
            },
        );
        let _ = self.events.send(PresenceEvent::Updated { user_id, entry });
    }

    /// Explicit sign-out: remove immediately rather than waiting on the timeout.
    pub fn set_offline(&self, user_id: Uuid) {
        self.users.write().unwrap().remove(&user_id);
        let _ = self.events.send(PresenceEvent::Removed { user_id });
    }

    pub fn get_online_users(&self) -> Vec<Uuid> {
        self.users.read().unwrap().keys().copied().collect()
    }

    pub fn get_entry(&self, user_id: Uuid) -> Option<PresenceEntry> {
        self.users.read().unwrap().get(&user_id).map(|t| t.entry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// Remove any user whose last `set_present` call is older than `timeout`.
    /// Intended to be driven by a periodic task, the server-side analogue of
    /// the ~30s presence timeout mentioned in §4.3.
    pub fn prune_stale(&self, timeout: Duration) -> Vec<Uuid> {
        let mut stale = Vec::new();
        {
            let mut users = self.users.write().unwrap();
            users.retain(|user_id, tracked| {
                let is_stale = tracked.last_seen.elapsed() > timeout;
                if is_stale {
                    stale.push(*user_id);
                }
                !is_stale
            });
        }
        for user_id in &stale {
            let _ = self.events.send(PresenceEvent::Removed {
                user_id: *user_id,
            });
        }
        stale
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
