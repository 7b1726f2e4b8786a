//! Session-bound ceremony state and the guards around it
//!
//! The session store itself belongs to the embedding application; this
//! module defines the key/value contract the ceremonies write their pending
//! state through, and the checks every ceremony completion must pass before
//! any collaborator is consulted: the fields exist, the principal is
//! unchanged, the challenge window is still open.

use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::CeremonyError;

/// Session field names. Part of the contract with the embedding application:
/// anything else it keeps under these keys will be overwritten.
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const USER_ID: &str = "userId";
    pub const REGISTER_CHALLENGE: &str = "registerChallenge";
    pub const REGISTER_CHALLENGE_TIME: &str = "registerChallengeTime";
    pub const LOGIN_CHALLENGE: &str = "loginChallenge";
    pub const LOGIN_CHALLENGE_TIME: &str = "loginChallengeTime";
}

/// Which ceremony a pending challenge belongs to. The two ceremonies use
/// disjoint session keys, so a pending registration never satisfies a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Login,
}

impl CeremonyKind {
    fn challenge_key(self) -> &'static str {
        match self {
            CeremonyKind::Registration => keys::REGISTER_CHALLENGE,
            CeremonyKind::Login => keys::LOGIN_CHALLENGE,
        }
    }

    fn challenge_time_key(self) -> &'static str {
        match self {
            CeremonyKind::Registration => keys::REGISTER_CHALLENGE_TIME,
            CeremonyKind::Login => keys::LOGIN_CHALLENGE_TIME,
        }
    }
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyKind::Registration => write!(f, "register"),
            CeremonyKind::Login => write!(f, "login"),
        }
    }
}

/// Session-identifier rotation failed. Surfaced as fatal to the login that
/// requested it; a fixated session id must not survive authentication.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct RegenerateError(pub String);

/// The caller-owned session store, seen through the JSON key/value contract
/// the ceremonies persist their pending state into. One value per key;
/// writing a key replaces whatever was there.
pub trait SessionTransport: Send {
    fn get(&self, key: &str) -> Option<Value>;

    fn insert(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str);

    /// Rotate the session identifier and drop every stored field. Called
    /// once after a verified login to defeat session fixation.
    fn regenerate(&mut self) -> Result<(), RegenerateError>;
}

/// Pending state for one ceremony, pulled out of the session and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCeremony {
    pub username: String,
    /// Opaque user handle, base64url
    pub user_handle: String,
    /// The issued challenge, base64url
    pub challenge: String,
    /// Issuance wall-clock time, ms since the epoch
    pub issued_at_ms: i64,
}

/// Current wall clock in milliseconds since the epoch, the unit session
/// timestamps are stored in.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Pull the four fields `kind` requires out of the session. A field that is
/// absent or of the wrong type means the transport is broken or was never
/// established for this caller, not that the request body is bad.
pub fn require_fields(
    session: &dyn SessionTransport,
    kind: CeremonyKind,
) -> Result<PendingCeremony, CeremonyError> {
    let username = require_string(session, keys::USERNAME)?;
    let user_handle = require_string(session, keys::USER_ID)?;
    let challenge = require_string(session, kind.challenge_key())?;
    let issued_at_ms = require_number(session, kind.challenge_time_key())?;

    Ok(PendingCeremony {
        username,
        user_handle,
        challenge,
        issued_at_ms,
    })
}

fn require_string(session: &dyn SessionTransport, key: &'static str) -> Result<String, CeremonyError> {
    match session.get(key) {
        Some(Value::String(value)) => Ok(value),
        _ => Err(CeremonyError::SessionMissing(key)),
    }
}

fn require_number(session: &dyn SessionTransport, key: &'static str) -> Result<i64, CeremonyError> {
    session
        .get(key)
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or(CeremonyError::SessionMissing(key))
}

/// A challenge is expired once `now >= issued_at + timeout`. The boundary
/// instant itself is already too late. The deadline saturates at the clock
/// range so a corrupted timestamp cannot overflow the comparison.
pub fn is_expired(issued_at_ms: i64, now_ms: i64, timeout: Duration) -> bool {
    let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    now_ms >= issued_at_ms.saturating_add(timeout_ms)
}

/// The principal completing a ceremony must be the one it was issued to.
pub fn principal_unchanged(session_username: &str, request_username: &str) -> bool {
    session_username == request_username
}

/// Persist the pending state for `kind`. The single live challenge per
/// ceremony kind is whatever was written last; an unanswered predecessor is
/// silently replaced.
pub fn store_pending(
    session: &mut dyn SessionTransport,
    kind: CeremonyKind,
    username: &str,
    user_handle: &str,
    challenge: &str,
    issued_at_ms: i64,
) {
    session.insert(keys::USERNAME, Value::from(username));
    session.insert(keys::USER_ID, Value::from(user_handle));
    session.insert(kind.challenge_key(), Value::from(challenge));
    session.insert(kind.challenge_time_key(), Value::from(issued_at_ms));
}

/// Drop a consumed challenge. Challenges are single-use; this runs on the
/// success path before the response leaves the ceremony.
pub fn clear_pending(session: &mut dyn SessionTransport, kind: CeremonyKind) {
    session.remove(kind.challenge_key());
    session.remove(kind.challenge_time_key());
}
