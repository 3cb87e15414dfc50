//! Durable session + notification store (C2).
//!
//! Mirrors `storage/social_store.rs`'s `SocialStore<'a>` pattern: every
//! `rusqlite::Error` is mapped through a dedicated error enum, rows are
//! converted through small `row_to_*` helpers, and ids/timestamps cross the
//! SQLite boundary as TEXT/RFC3339 strings.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::live_session::invite;
use crate::live_session::types::{
    NotificationType, ParticipantId, RoutineExercise, Session, SessionStatus, SyncMode,
};
use crate::storage::Database;

const MAX_PARTICIPANTS: usize = 10;
const INVITE_CODE_RETRIES: u32 = 5;

/// Store errors, named after the error kinds in the error handling design.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session is full")]
    Full,
    #[error("session has already ended")]
    Terminal,
    #[error("user is not a member of this session")]
    NotMember,
    #[error("caller is not permitted to read this session")]
    Forbidden,
    #[error("invite code collided")]
    Conflict,
    #[error("could not allocate a unique invite code after {0} attempts")]
    Exhausted(u32),
    #[error("session not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// SQLite-backed implementation of the durable session store, the crate's
/// stand-in for a Postgres-backed `Store` per the spec's persistence contract.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let id: String = row.get("id")?;
        let host_id: String = row.get("host_id")?;
        let leader_id: String = row.get("leader_id")?;
        let status: String = row.get("status")?;
        let invite_code: Option<String> = row.get("invite_code")?;
        let routine_json: Option<String> = row.get("routine_json")?;
        let sync_mode: Option<String> = row.get("sync_mode")?;
        let created_at: String = row.get("created_at")?;
        let started_at: Option<String> = row.get("started_at")?;
        let ended_at: Option<String> = row.get("ended_at")?;

        Ok(Session {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            host_id: Uuid::parse_str(&host_id).unwrap_or_default(),
            leader_id: Uuid::parse_str(&leader_id).unwrap_or_default(),
            participant_ids: Vec::new(),
            status: parse_status(&status),
            invite_code,
            routine_data: routine_json
                .and_then(|s| serde_json::from_str::<Vec<RoutineExercise>>(&s).ok()),
            sync_mode: sync_mode.map(|s| parse_sync_mode(&s)),
            participant_heartbeats: HashMap::new(),
            created_at: parse_ts(&created_at),
            started_at: started_at.map(|s| parse_ts(&s)),
            ended_at: ended_at.map(|s| parse_ts(&s)),
        })
    }

    fn load_participants(&self, conn: &rusqlite::Connection, session_id: Uuid) -> Result<Vec<ParticipantId>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT user_id FROM session_participants WHERE session_id = ?1 AND left_at IS NULL",
        )?;
        let ids = stmt
            .query_map(params![session_id.to_string()], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect();
        Ok(ids)
    }

    fn load_heartbeats(
        &self,
        conn: &rusqlite::Connection,
        session_id: Uuid,
    ) -> Result<HashMap<ParticipantId, DateTime<Utc>>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT user_id, last_seen_at FROM session_heartbeats WHERE session_id = ?1")?;
        let rows = stmt.query_map(params![session_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (user_id, ts) = row?;
            if let Ok(uid) = Uuid::parse_str(&user_id) {
                map.insert(uid, parse_ts(&ts));
            }
        }
        Ok(map)
    }

    fn hydrate(&self, conn: &rusqlite::Connection, mut session: Session) -> Result<Session, StoreError> {
        session.participant_ids = self.load_participants(conn, session.id)?;
        session.participant_heartbeats = self.load_heartbeats(conn, session.id)?;
        Ok(session)
    }

    fn fetch_by_id(&self, conn: &rusqlite::Connection, session_id: Uuid) -> Result<Session, StoreError> {
        let session = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![session_id.to_string()],
                Self::row_to_session,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        self.hydrate(conn, session)
    }

    fn authorize(session: &Session, requesting_user: ParticipantId) -> Result<(), StoreError> {
        if session.host_id == requesting_user
            || session.leader_id == requesting_user
            || session.participant_ids.contains(&requesting_user)
        {
            Ok(())
        } else {
            Err(StoreError::Forbidden)
        }
    }

    /// Row-level-authorised read. Any member of `{host, leader, participants}`
    /// may read the session; everyone else gets `Forbidden`.
    pub async fn get_session(
        &self,
        session_id: Uuid,
        requesting_user: ParticipantId,
    ) -> Result<Session, StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let session = self.fetch_by_id(conn, session_id)?;
        Self::authorize(&session, requesting_user)?;
        Ok(session)
    }

    /// `createSession` (§4.2): persists a new session owned and led by `host_id`.
    pub async fn create_session(
        &self,
        host_id: ParticipantId,
        routine_data: Option<Vec<RoutineExercise>>,
        sync_mode: Option<SyncMode>,
        code_length: usize,
    ) -> Result<Session, StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let now = Utc::now();
        let id = Uuid::new_v4();

        let mut code = None;
        for attempt in 0..INVITE_CODE_RETRIES {
            let candidate = invite::generate_invite_code(code_length);
            let collides: bool = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE invite_code = ?1 AND status != 'completed' AND status != 'cancelled'",
                    params![candidate],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !collides {
                code = Some(candidate);
                break;
            }
            tracing::warn!(attempt, "invite code collision, retrying");
        }
        let code = code.ok_or(StoreError::Exhausted(INVITE_CODE_RETRIES))?;

        let routine_json = routine_data
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_default());

        conn.execute(
            "INSERT INTO sessions (id, host_id, leader_id, title, status, sync_mode, invite_code, max_participants, routine_json, created_at)
             VALUES (?1, ?2, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                host_id.to_string(),
                "Live Workout Session",
                sync_mode.map(format_sync_mode),
                code,
                MAX_PARTICIPANTS as i64,
                routine_json,
                now.to_rfc3339(),
            ],
        )?;

        let participant_row_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO session_participants (id, session_id, user_id, display_name, joined_at)
             VALUES (?1, ?2, ?3, '', ?4)",
            params![
                participant_row_id.to_string(),
                id.to_string(),
                host_id.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        drop(guard);
        self.get_session(id, host_id).await
    }

    /// `findByInviteCode` (§4.2, §4.6): the one privileged read that bypasses
    /// row-level authorisation, filtered to non-terminal sessions.
    pub async fn find_by_invite_code(&self, code: &str) -> Result<Session, StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let normalized = code.trim().to_uppercase();

        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM sessions WHERE invite_code = ?1 AND status != 'completed' AND status != 'cancelled'",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?;

        let id = id.ok_or(StoreError::NotFound)?;
        let session_id = Uuid::parse_str(&id).map_err(|e| StoreError::Database(e.to_string()))?;
        let session = self.fetch_by_id(conn, session_id)?;
        Ok(session)
    }

    /// `updateStatus` (§4.2).
    pub async fn update_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let current = self.fetch_by_id(conn, session_id)?;
        if current.status.is_terminal() {
            return Err(StoreError::Terminal);
        }

        conn.execute(
            "UPDATE sessions SET status = ?2, started_at = COALESCE(?3, started_at), ended_at = COALESCE(?4, ended_at) WHERE id = ?1",
            params![
                session_id.to_string(),
                format_status(status),
                started_at.map(|t| t.to_rfc3339()),
                ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// `addParticipant` (§4.2): idempotent, rejects `Full`/`Terminal`.
    pub async fn add_participant(
        &self,
        session_id: Uuid,
        user_id: ParticipantId,
        display_name: &str,
    ) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let session = self.fetch_by_id(conn, session_id)?;

        if session.status.is_terminal() {
            return Err(StoreError::Terminal);
        }
        if session.participant_ids.contains(&user_id) {
            return Ok(());
        }
        if session.participant_ids.len() >= MAX_PARTICIPANTS {
            return Err(StoreError::Full);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO session_participants (id, session_id, user_id, display_name, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id, user_id) DO UPDATE SET left_at = NULL, joined_at = excluded.joined_at",
            params![
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                user_id.to_string(),
                display_name,
                now.to_rfc3339(),
            ],
        )?;

        if session.status == SessionStatus::Pending {
            conn.execute(
                "UPDATE sessions SET status = 'active', started_at = COALESCE(started_at, ?2) WHERE id = ?1",
                params![session_id.to_string(), now.to_rfc3339()],
            )?;
        }

        Ok(())
    }

    /// `removeParticipant` (§4.2): idempotent.
    pub async fn remove_participant(
        &self,
        session_id: Uuid,
        user_id: ParticipantId,
    ) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let now = Utc::now();
        conn.execute(
            "UPDATE session_participants SET left_at = ?3 WHERE session_id = ?1 AND user_id = ?2 AND left_at IS NULL",
            params![session_id.to_string(), user_id.to_string(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// `setLeader` (§4.2): fails `NotMember` if `user_id` isn't a current participant.
    pub async fn set_leader(&self, session_id: Uuid, user_id: ParticipantId) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let session = self.fetch_by_id(conn, session_id)?;
        if session.status.is_terminal() {
            return Err(StoreError::Terminal);
        }
        if !session.participant_ids.contains(&user_id) {
            return Err(StoreError::NotMember);
        }
        conn.execute(
            "UPDATE sessions SET leader_id = ?2 WHERE id = ?1",
            params![session_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    /// `writeHeartbeat` (§4.2): merges into the heartbeat mapping.
    pub async fn write_heartbeat(&self, session_id: Uuid, user_id: ParticipantId) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO session_heartbeats (session_id, user_id, last_seen_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id, user_id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
            params![session_id.to_string(), user_id.to_string(), now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// `createNotification` (§4.2).
    pub async fn create_notification(
        &self,
        user_id: ParticipantId,
        notification_type: NotificationType,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO notifications (id, user_id, notification_type, title, body, data_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                user_id.to_string(),
                format_notification_type(notification_type),
                title,
                body,
                serde_json::to_string(&data).unwrap_or_default(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// `markRead` (§4.2).
    pub async fn mark_read(&self, notification_id: Uuid) -> Result<(), StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![notification_id.to_string()],
        )?;
        Ok(())
    }

    /// `listUnread` (§4.2).
    pub async fn list_unread(&self, user_id: ParticipantId) -> Result<Vec<Uuid>, StoreError> {
        let guard = self.db.lock().unwrap();
        let conn = guard.connection();
        let mut stmt = conn.prepare(
            "SELECT id FROM notifications WHERE user_id = ?1 AND read = 0 ORDER BY created_at",
        )?;
        let ids = stmt
            .query_map(params![user_id.to_string()], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect();
        Ok(ids)
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "active" => SessionStatus::Active,
        "completed" => SessionStatus::Completed,
        "cancelled" => SessionStatus::Cancelled,
        _ => SessionStatus::Pending,
    }
}

fn format_status(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Pending => "pending",
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn parse_sync_mode(s: &str) -> SyncMode {
    match s {
        "strict" => SyncMode::Strict,
        _ => SyncMode::Soft,
    }
}

fn format_sync_mode(m: SyncMode) -> &'static str {
    match m {
        SyncMode::Strict => "strict",
        SyncMode::Soft => "soft",
    }
}

fn format_notification_type(t: NotificationType) -> &'static str {
    match t {
        NotificationType::LiveInvite => "live_invite",
        NotificationType::LiveAccepted => "live_accepted",
        NotificationType::JoinRequest => "join_request",
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
