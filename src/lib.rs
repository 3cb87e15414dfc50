//! LiftSync - realtime multi-participant live workout session coordination.
//!
//! Coordinates presence, membership, synchronized exercise transitions and
//! reactions for a group of people training together in real time.

pub mod live_session;
pub mod storage;

pub use live_session::manager::SessionManager;
pub use live_session::types::{
    LiveUserState, Notification, Reaction, Session, SessionEvent, SessionStatus, SyncEvent,
};
pub use storage::config::{AppConfig, SessionSettings};
