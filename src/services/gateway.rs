//! Serializable read-modify-write over one session aggregate.
//!
//! Every mutating command goes through [`run_in_transaction`]: load the session and its
//! revision, run the command body on a private copy, then compare-and-swap the copy back.
//! A moved revision surfaces as a transient [`StorageError::Conflict`] and the whole
//! body is retried against fresh state.

use std::{future::Future, sync::Arc, time::Duration};

use rand::Rng;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::SessionEntity,
        session_store::SessionStore,
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    state::{SharedState, session::GameSession},
};

const MAX_BACKOFF: Duration = Duration::from_secs(5);
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Outcome of a committed (or no-op) transaction.
#[derive(Debug)]
pub struct Committed<T> {
    /// Session as it was written (or read, when nothing changed).
    pub session: GameSession,
    /// Value returned by the command body.
    pub value: T,
    /// Whether a write happened.
    pub changed: bool,
}

enum AttemptError {
    Storage(StorageError),
    Service(ServiceError),
}

impl From<StorageError> for AttemptError {
    fn from(err: StorageError) -> Self {
        AttemptError::Storage(err)
    }
}

impl From<ServiceError> for AttemptError {
    fn from(err: ServiceError) -> Self {
        AttemptError::Service(err)
    }
}

async fn current_store(state: &SharedState) -> Result<Arc<dyn SessionStore>, ServiceError> {
    state.session_store().await.ok_or(ServiceError::Degraded)
}

/// Bound a store call by the transaction timeout.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = StorageResult<T>>,
) -> StorageResult<T> {
    timeout(limit, call)
        .await
        .unwrap_or(Err(StorageError::Timeout(limit)))
}

/// Run `body` against session `session_id` inside one optimistic transaction.
///
/// `body` may run several times and must only act on the session it is given.
/// Its errors abort the transaction without retry.
pub async fn run_in_transaction<T, F>(
    state: &SharedState,
    session_id: Uuid,
    mut body: F,
) -> Result<Committed<T>, ServiceError>
where
    F: FnMut(&mut GameSession, OffsetDateTime) -> Result<T, ServiceError>,
{
    let policy = state.config().retry();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match attempt_once(state, session_id, &mut body).await {
            Ok(committed) => return Ok(committed),
            Err(AttemptError::Service(err)) => return Err(err),
            Err(AttemptError::Storage(err)) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(%session_id, attempt, ?delay, error = %err, "transaction contended; retrying");
                sleep(delay).await;
            }
            Err(AttemptError::Storage(err)) if err.is_transient() => {
                warn!(%session_id, attempt, error = %err, "transaction retries exhausted");
                return Err(ServiceError::Unavailable(err));
            }
            Err(AttemptError::Storage(err)) => {
                warn!(%session_id, attempt, error = %err, "transaction failed");
                return Err(err.into());
            }
        }
    }
}

async fn attempt_once<T, F>(
    state: &SharedState,
    session_id: Uuid,
    body: &mut F,
) -> Result<Committed<T>, AttemptError>
where
    F: FnMut(&mut GameSession, OffsetDateTime) -> Result<T, ServiceError>,
{
    let store = current_store(state).await?;
    let limit = state.transaction_timeout();

    let versioned = bounded(limit, store.load(session_id))
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id} not found")))?;

    let original = GameSession::from(versioned.value);
    let mut session = original.clone();
    let now = OffsetDateTime::now_utc();
    let value = body(&mut session, now)?;

    if session == original {
        return Ok(Committed {
            session,
            value,
            changed: false,
        });
    }

    session.updated_at = now;
    bounded(
        limit,
        store.commit(SessionEntity::from(&session), versioned.revision),
    )
    .await?;

    Ok(Committed {
        session,
        value,
        changed: true,
    })
}

/// Persist a brand new session, drawing a fresh join code on every collision.
///
/// `build` receives the candidate code and returns the session to insert.
pub async fn insert_session<F>(state: &SharedState, mut build: F) -> Result<GameSession, ServiceError>
where
    F: FnMut(String) -> Result<GameSession, ServiceError>,
{
    let policy = state.config().retry();
    let limit = state.transaction_timeout();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let store = current_store(state).await?;
        let session = build(generate_code(&mut rand::rng()))?;

        match bounded(limit, store.insert(SessionEntity::from(&session))).await {
            Ok(_) => return Ok(session),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                debug!(attempt, error = %err, "session insert collided; drawing a new code");
                sleep(policy.delay_for(attempt)).await;
            }
            Err(err) if err.is_transient() => {
                warn!(attempt, error = %err, "could not allocate a join code");
                return Err(ServiceError::Unavailable(err));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Load the latest committed state of a session.
pub async fn read_session(state: &SharedState, session_id: Uuid) -> Result<GameSession, ServiceError> {
    let store = current_store(state).await?;
    bounded(state.transaction_timeout(), store.load(session_id))
        .await?
        .map(|versioned| GameSession::from(versioned.value))
        .ok_or_else(|| ServiceError::NotFound(format!("session {session_id} not found")))
}

/// Resolve a join code to its session id.
pub async fn find_session_by_code(state: &SharedState, code: &str) -> Result<Uuid, ServiceError> {
    let store = current_store(state).await?;
    bounded(
        state.transaction_timeout(),
        store.find_by_code(code.trim().to_uppercase()),
    )
    .await?
    .ok_or_else(|| ServiceError::NotFound(format!("no session with code {}", code.trim())))
}

/// Random join code from an alphabet without look-alike characters.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
