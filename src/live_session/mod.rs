//! Live Workout Session subsystem: realtime multi-participant coordination
//! built from seven components (transport, store, presence, session
//! manager, sync coordinator, invite/join, finish protocol).

pub mod config;
pub mod finish;
pub mod invite;
pub mod manager;
pub mod presence;
pub mod store;
pub mod sync_coordinator;
pub mod transport;
pub mod types;

pub use finish::{finish, force_end, FinishOutcome, SessionSummary};
pub use invite::{generate_invite_code, join_by_invite_code, normalize_invite_code, InviteError};
pub use manager::{ManagerError, SessionHandle, SessionManager};
pub use presence::{PresenceEntry, PresenceEvent, PresenceTracker};
pub use store::{SqliteStore, StoreError};
pub use sync_coordinator::SyncCoordinator;
pub use transport::{InProcessTransport, Transport, TopicHandle, WireEvent};
pub use types::{
    ConnectionStatus, LiveUserState, Notification, NotificationType, ParticipantId, Reaction,
    ReactionType, Session, SessionEvent, SessionStatus, SyncEvent, SyncMode,
};
