use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use wander_db::{ConversationLookup, Database, is_transient};
use wander_types::models::{ConversationId, UserId};
use wander_types::pair::ParticipantPair;

use crate::error::ChatError;
use crate::run_blocking;

/// Attempts before a transient storage failure is given up on.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Conversation resolution kept hitting transient storage failures.
#[derive(Debug, Error)]
#[error("conversation ({low}, {high}) unresolved after {attempts} attempts")]
pub struct DirectoryError {
    pub low: UserId,
    pub high: UserId,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

/// Maps an unordered pair of users to their single conversation.
///
/// Serves explicit lookups (`POST /conversations`). Sending a message resolves
/// its conversation inside the relay's own write transaction instead.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: Arc<Database>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Same id for `(a, b)` and `(b, a)`; the conversation is created on first use.
    pub async fn get_or_create(&self, a: UserId, b: UserId) -> Result<ConversationId, ChatError> {
        let pair = normalize(a, b)?;
        let db = self.db.clone();

        match retry_transient(pair, move || db.resolve_conversation(pair)).await? {
            ConversationLookup::Found { id, created } => {
                if created {
                    info!("Created conversation {} for ({}, {})", id, pair.low(), pair.high());
                }
                Ok(id)
            }
            ConversationLookup::UnknownUser(user_id) => {
                Err(ChatError::NotFound(format!("user {}", user_id)))
            }
        }
    }
}

pub(crate) fn normalize(a: UserId, b: UserId) -> Result<ParticipantPair, ChatError> {
    ParticipantPair::new(a, b)
        .ok_or_else(|| ChatError::validation("a conversation needs two different users"))
}

/// Run `op` on the blocking pool, retrying busy/locked failures.
pub(crate) async fn retry_transient<F, T>(pair: ParticipantPair, op: F) -> Result<T, ChatError>
where
    F: Fn() -> anyhow::Result<T> + Clone + Send + 'static,
    T: Send + 'static,
{
    let mut attempt = 1;
    loop {
        let attempt_op = op.clone();
        let result = run_blocking(move || Ok(attempt_op())).await?;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                warn!(
                    "Transient storage failure for ({}, {}), attempt {}: {}",
                    pair.low(),
                    pair.high(),
                    attempt,
                    e
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) if is_transient(&e) => {
                return Err(DirectoryError {
                    low: pair.low(),
                    high: pair.high(),
                    attempts: attempt,
                    source: e,
                }
                .into());
            }
            Err(e) => return Err(ChatError::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> (ConversationDirectory, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for (id, name) in [(1, "ana"), (2, "ben"), (7, "gus"), (9, "ida")] {
            db.create_user(id, name).unwrap();
        }
        (ConversationDirectory::new(db.clone()), db)
    }

    fn conversation_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn symmetric_and_idempotent() {
        let (dir, db) = directory();
        let ab = dir.get_or_create(7, 9).await.unwrap();
        let ba = dir.get_or_create(9, 7).await.unwrap();
        let again = dir.get_or_create(7, 9).await.unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab, again);
        assert_eq!(conversation_rows(&db), 1);
    }

    #[tokio::test]
    async fn self_conversation_is_invalid() {
        let (dir, _db) = directory();
        assert!(matches!(dir.get_or_create(1, 1).await, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (dir, db) = directory();
        assert!(matches!(dir.get_or_create(1, 404).await, Err(ChatError::NotFound(_))));
        assert_eq!(conversation_rows(&db), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_contact_yields_one_conversation() {
        let (dir, db) = directory();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let dir = dir.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        dir.get_or_create(1, 2).await
                    } else {
                        dir.get_or_create(2, 1).await
                    }
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(ids.len(), 16);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(conversation_rows(&db), 1);
    }

    #[test]
    fn directory_error_becomes_storage_error() {
        let err: ChatError = DirectoryError {
            low: 1,
            high: 2,
            attempts: MAX_ATTEMPTS,
            source: anyhow::anyhow!("database is locked"),
        }
        .into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert_eq!(err.client_message(), "internal server error");
    }
}
