//! Invite code generation and redemption (C6).
//!
//! Code generation reuses the teacher's `social::clubs::generate_join_code`
//! idiom (a seeded multiplicative-congruential generator over a fixed
//! charset) adapted to the spec's 6-character `[A-Z0-9]` alphabet rather than
//! the club code's ambiguity-avoiding subset.

use uuid::Uuid;

use crate::live_session::manager::{ManagerError, SessionManager};
use crate::live_session::store::{SqliteStore, StoreError};
use crate::live_session::types::ParticipantId;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a random invite code of the given length over `[A-Z0-9]`.
pub fn generate_invite_code(length: usize) -> String {
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;

    let mut state = seed ^ (Uuid::new_v4().as_u128() as u64);
    let mut code = String::with_capacity(length);

    for _ in 0..length {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let idx = (state % CHARSET.len() as u64) as usize;
        code.push(CHARSET[idx] as char);
    }

    code
}

/// Normalize user-entered invite codes: uppercase and trim whitespace,
/// rejecting characters outside the invite alphabet.
pub fn normalize_invite_code(raw: &str) -> Result<String, InviteError> {
    let trimmed = raw.trim().to_uppercase();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| CHARSET.contains(&b)) {
        return Err(InviteError::InvalidFormat);
    }
    Ok(trimmed)
}

/// Redeem an invite code on behalf of `user_id`: look the session up via the
/// store's privileged function, then run the normal accept path.
pub async fn join_by_invite_code(
    manager: &SessionManager,
    store: &SqliteStore,
    raw_code: &str,
    user_id: ParticipantId,
    display_name: &str,
) -> Result<Uuid, InviteError> {
    let code = normalize_invite_code(raw_code)?;
    let session = store.find_by_invite_code(&code).await?;
    manager
        .accept_invite(session.id, user_id, display_name)
        .await?;
    Ok(session.id)
}

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    #[error("invite code must contain only A-Z and 0-9 characters")]
    InvalidFormat,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_use_the_expected_alphabet() {
        let code = generate_invite_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn normalize_accepts_lowercase_and_trims() {
        let normalized = normalize_invite_code(" abc123 ").unwrap();
        assert_eq!(normalized, "ABC123");
    }

    #[test]
    fn normalize_rejects_invalid_characters() {
        assert!(normalize_invite_code("abc-123").is_err());
    }
}
