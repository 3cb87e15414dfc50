//! Shared helpers for spinning up in-process session managers sharing one
//! store, transport, and presence tracker.

use std::sync::Arc;

use liftsync::live_session::{InProcessTransport, PresenceTracker, SessionManager, SqliteStore, Transport};
use liftsync::storage::{Database, SessionSettings};
use uuid::Uuid;

pub struct World {
    pub store: Arc<SqliteStore>,
    pub transport: Arc<dyn Transport>,
    pub presence: Arc<PresenceTracker>,
    pub settings: SessionSettings,
}

impl World {
    pub fn new() -> Self {
        Self {
            store: Arc::new(SqliteStore::new(Database::open_in_memory().unwrap())),
            transport: Arc::new(InProcessTransport::new()),
            presence: Arc::new(PresenceTracker::new()),
            settings: SessionSettings::default(),
        }
    }

    pub fn with_settings(settings: SessionSettings) -> Self {
        Self {
            settings,
            ..Self::new()
        }
    }

    pub fn manager(&self, display_name: &str) -> SessionManager {
        SessionManager::new(
            Uuid::new_v4(),
            display_name,
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.presence),
            self.settings.clone(),
        )
    }
}
