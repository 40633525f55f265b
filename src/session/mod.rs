//! Per-user session and generation quota
//!
//! Provides:
//! - Session records persisted as JSON in the key-value store
//! - Partial updates (read-modify-write, last write wins)
//! - Generation counting against a fixed per-user ceiling
//!
//! Sessions are keyed by the numeric user id only. The username is carried
//! for logging and never participates in the key, so setting or clearing a
//! username does not fork the quota.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::kv::{KvError, KvStore};

/// Generations allowed per user
pub const MAX_GENERATIONS: u32 = 5;

/// Attempts for the compare-and-swap loop before giving up
const CAS_ATTEMPTS: usize = 16;

/// Conversational state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    WaitingPhoto,
    /// Informational only; nothing rejects photos while processing
    Processing,
}

/// Durable per-user record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub state: SessionState,
    #[serde(default)]
    pub generations_used: u32,
}

/// Fields to merge over an existing session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub state: Option<SessionState>,
    pub generations_used: Option<u32>,
}

impl SessionUpdate {
    /// Update only the state
    pub fn state(state: SessionState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    fn apply(self, session: &mut UserSession) {
        if let Some(state) = self.state {
            session.state = state;
        }
        if let Some(used) = self.generations_used {
            session.generations_used = used;
        }
    }
}

/// Who a session belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub username: Option<String>,
}

impl UserIdentity {
    pub fn new(id: i64, username: Option<String>) -> Self {
        Self { id, username }
    }

    /// Storage key for this user's session
    pub fn session_key(&self) -> String {
        format!("user:{}:session", self.id)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(name) => write!(f, "{} (@{})", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Snapshot of quota usage taken from a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSummary {
    pub used: u32,
    pub remaining: u32,
    pub max: u32,
}

impl UsageSummary {
    pub fn from_used(used: u32) -> Self {
        Self {
            used,
            remaining: MAX_GENERATIONS.saturating_sub(used),
            max: MAX_GENERATIONS,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("corrupt session record at {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to encode session: {0}")]
    Encode(serde_json::Error),

    #[error("too much contention updating {0}")]
    Contention(String),
}

/// Session and quota manager over a key-value store
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Get a session, materializing and persisting a default one if absent
    pub async fn get(&self, user: &UserIdentity) -> Result<UserSession, SessionError> {
        let key = user.session_key();

        loop {
            let (session, raw) = self.load(&key).await?;
            if raw.is_some() {
                return Ok(session);
            }

            let encoded = encode(&session)?;
            if self.kv.compare_and_swap(&key, None, &encoded).await? {
                debug!("Created new session for user {}", user);
                return Ok(session);
            }
            // Someone else created it first; read theirs
        }
    }

    /// Merge the given fields over the stored session
    pub async fn update(
        &self,
        user: &UserIdentity,
        update: SessionUpdate,
    ) -> Result<UserSession, SessionError> {
        let key = user.session_key();
        let (mut session, _) = self.load(&key).await?;
        let before = session.clone();

        update.apply(&mut session);
        self.kv.put(&key, &encode(&session)?).await?;

        debug!(
            "Session updated for user {}: {:?} -> {:?}",
            user, before, session
        );
        Ok(session)
    }

    /// Overwrite with a fresh default session
    pub async fn reset(&self, user: &UserIdentity) -> Result<(), SessionError> {
        let session = UserSession::default();
        self.kv.put(&user.session_key(), &encode(&session)?).await?;
        debug!("Session reset for user {}", user);
        Ok(())
    }

    /// Increment the generation counter by one, unconditionally
    pub async fn increment_generations(&self, user: &UserIdentity) -> Result<u32, SessionError> {
        let key = user.session_key();
        let (mut session, _) = self.load(&key).await?;
        let before = session.generations_used;

        session.generations_used = before.saturating_add(1);
        self.kv.put(&key, &encode(&session)?).await?;

        debug!(
            "Generations incremented for user {}: {} -> {}",
            user, before, session.generations_used
        );
        Ok(session.generations_used)
    }

    /// Increment the counter only while it is below the limit
    ///
    /// The check and the write happen as one compare-and-swap, so concurrent
    /// callers cannot push the counter past `MAX_GENERATIONS`.
    /// Returns false when the limit was already reached.
    pub async fn try_increment_generations(
        &self,
        user: &UserIdentity,
    ) -> Result<bool, SessionError> {
        let key = user.session_key();

        for _ in 0..CAS_ATTEMPTS {
            let (mut session, raw) = self.load(&key).await?;
            if session.generations_used >= MAX_GENERATIONS {
                debug!(
                    "User {} already at limit ({}/{})",
                    user, session.generations_used, MAX_GENERATIONS
                );
                return Ok(false);
            }

            session.generations_used += 1;
            let encoded = encode(&session)?;
            if self
                .kv
                .compare_and_swap(&key, raw.as_deref(), &encoded)
                .await?
            {
                debug!(
                    "Generations incremented for user {}: now {}",
                    user, session.generations_used
                );
                return Ok(true);
            }
        }

        Err(SessionError::Contention(key))
    }

    /// True iff the user has used all generations
    pub async fn has_reached_limit(&self, user: &UserIdentity) -> Result<bool, SessionError> {
        Ok(self.usage(user).await?.is_exhausted())
    }

    /// Generations left, never negative
    pub async fn remaining(&self, user: &UserIdentity) -> Result<u32, SessionError> {
        Ok(self.usage(user).await?.remaining)
    }

    /// Raw counter value
    pub async fn used(&self, user: &UserIdentity) -> Result<u32, SessionError> {
        Ok(self.get(user).await?.generations_used)
    }

    /// Used, remaining and max from one read
    pub async fn usage(&self, user: &UserIdentity) -> Result<UsageSummary, SessionError> {
        let session = self.get(user).await?;
        Ok(UsageSummary::from_used(session.generations_used))
    }

    pub async fn is_waiting_for_photo(&self, user: &UserIdentity) -> Result<bool, SessionError> {
        Ok(self.get(user).await?.state == SessionState::WaitingPhoto)
    }

    pub async fn is_processing(&self, user: &UserIdentity) -> Result<bool, SessionError> {
        Ok(self.get(user).await?.state == SessionState::Processing)
    }

    /// Read and decode; absent records decode as the default session
    async fn load(&self, key: &str) -> Result<(UserSession, Option<String>), SessionError> {
        let raw = self.kv.get(key).await?;
        let session = match raw.as_deref() {
            Some(data) => serde_json::from_str(data).map_err(|source| SessionError::Corrupt {
                key: key.to_string(),
                source,
            })?,
            None => UserSession::default(),
        };
        Ok((session, raw))
    }
}

fn encode(session: &UserSession) -> Result<String, SessionError> {
    serde_json::to_string(session).map_err(SessionError::Encode)
}
