use crate::Database;
use crate::models::{
    ConversationRow, ConversationSummaryRow, MessageRow, NotificationRow, UserRow, now_timestamp,
};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, TransactionBehavior};
use wander_types::pair::ParticipantPair;

/// Result of resolving a participant pair to its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationLookup {
    Found { id: i64, created: bool },
    UnknownUser(i64),
}

/// Result of the send-message transaction.
pub enum SendOutcome {
    Sent {
        message: MessageRow,
        conversation_created: bool,
    },
    UnknownUser(i64),
}

impl Database {
    // -- Users --

    pub fn create_user(&self, id: i64, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                rusqlite::params![id, username],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    // -- Conversations --

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, participant_low, participant_high, created_at
                 FROM conversations WHERE id = ?1",
                [id],
                map_conversation,
            )
            .optional()
        })
    }

    pub fn find_conversation(&self, pair: ParticipantPair) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, participant_low, participant_high, created_at
                 FROM conversations WHERE participant_low = ?1 AND participant_high = ?2",
                rusqlite::params![pair.low(), pair.high()],
                map_conversation,
            )
            .optional()
        })
    }

    /// Look up the conversation for `pair`, creating it if absent.
    /// Check-then-insert runs inside one IMMEDIATE transaction.
    pub fn resolve_conversation(&self, pair: ParticipantPair) -> Result<ConversationLookup> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(missing) = first_unknown_user(&tx, &[pair.low(), pair.high()])? {
                return Ok(ConversationLookup::UnknownUser(missing));
            }

            let (id, created) = resolve_conversation_in(&tx, pair)?;
            tx.commit()?;
            Ok(ConversationLookup::Found { id, created })
        })
    }

    /// Conversations of `user_id` with partner info and the newest message,
    /// most recently active first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at, p.partner_id, u.username,
                        m.content, m.sender_id, m.sent_at
                 FROM (
                     SELECT id, created_at,
                            CASE WHEN participant_low = ?1 THEN participant_high
                                 ELSE participant_low END AS partner_id
                     FROM conversations
                     WHERE participant_low = ?1 OR participant_high = ?1
                 ) p
                 JOIN conversations c ON c.id = p.id
                 LEFT JOIN users u ON u.id = p.partner_id
                 LEFT JOIN messages m ON m.id = (
                     SELECT id FROM messages
                     WHERE conversation_id = c.id
                     ORDER BY sent_at DESC, id DESC
                     LIMIT 1
                 )
                 ORDER BY COALESCE(m.sent_at, c.created_at) DESC, c.id DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationSummaryRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        partner_id: row.get(2)?,
                        partner_username: row.get(3)?,
                        last_content: row.get(4)?,
                        last_sender_id: row.get(5)?,
                        last_sent_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    /// Resolve (or create) the conversation and insert the message in one
    /// transaction. Dropping the transaction on any error rolls both back.
    pub fn send_message(
        &self,
        sender_id: i64,
        pair: ParticipantPair,
        content: &str,
    ) -> Result<SendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(missing) = first_unknown_user(&tx, &[pair.low(), pair.high()])? {
                return Ok(SendOutcome::UnknownUser(missing));
            }

            let (conversation_id, conversation_created) = resolve_conversation_in(&tx, pair)?;

            // Never go backwards within a conversation, even if the clock does.
            let latest: Option<String> = tx.query_row(
                "SELECT MAX(sent_at) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            let now = now_timestamp();
            let sent_at = match latest {
                Some(latest) if latest > now => latest,
                _ => now,
            };

            tx.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![conversation_id, sender_id, content, sent_at],
            )?;
            let id = tx.last_insert_rowid();

            tx.commit()?;

            Ok(SendOutcome::Sent {
                message: MessageRow {
                    id,
                    conversation_id,
                    sender_id,
                    content: content.to_string(),
                    sent_at,
                },
                conversation_created,
            })
        })
    }

    /// Messages of a conversation, ascending by `sent_at`.
    ///
    /// With `limit`, the newest `limit` messages (older than `before`, if given)
    /// are returned, still in ascending order.
    pub fn get_messages(
        &self,
        conversation_id: i64,
        before: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, sent_at
                 FROM messages
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR id < ?2)
                 ORDER BY sent_at DESC, id DESC
                 LIMIT ?3",
            )?;

            // SQLite treats a negative LIMIT as unbounded.
            let limit = limit.map(i64::from).unwrap_or(-1);

            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, before, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    // -- Notifications --

    /// Returns `None` when the target user does not exist.
    pub fn insert_notification(
        &self,
        user_id: i64,
        message: &str,
        link_url: Option<&str>,
    ) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            if query_user(conn, user_id)?.is_none() {
                return Ok(None);
            }

            let created_at = now_timestamp();
            conn.execute(
                "INSERT INTO notifications (user_id, message, link_url, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, message, link_url, created_at],
            )?;

            Ok(Some(NotificationRow {
                id: conn.last_insert_rowid(),
                user_id,
                message: message.to_string(),
                link_url: link_url.map(str::to_string),
                is_read: false,
                created_at,
            }))
        })
    }

    /// Newest first.
    pub fn get_notifications(&self, user_id: i64, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, message, link_url, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        message: row.get(2)?,
                        link_url: row.get(3)?,
                        is_read: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Returns how many rows flipped from unread to read.
    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(updated)
        })
    }
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, username, created_at FROM users WHERE id = ?1",
        [id],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
}

fn first_unknown_user(conn: &Connection, ids: &[i64]) -> Result<Option<i64>> {
    for &id in ids {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

fn query_conversation_id(conn: &Connection, pair: ParticipantPair) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM conversations WHERE participant_low = ?1 AND participant_high = ?2",
        rusqlite::params![pair.low(), pair.high()],
        |row| row.get(0),
    )
    .optional()
}

/// Returns `(conversation_id, created)`. The unique index on the pair makes a
/// concurrent insert a no-op, after which the re-lookup finds the winner's row.
fn resolve_conversation_in(conn: &Connection, pair: ParticipantPair) -> Result<(i64, bool)> {
    if let Some(id) = query_conversation_id(conn, pair)? {
        return Ok((id, false));
    }

    let inserted = conn.execute(
        "INSERT INTO conversations (participant_low, participant_high, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (participant_low, participant_high) DO NOTHING",
        rusqlite::params![pair.low(), pair.high(), now_timestamp()],
    )?;

    let id = query_conversation_id(conn, pair)?.ok_or_else(|| {
        anyhow!(
            "conversation ({}, {}) missing after insert",
            pair.low(),
            pair.high()
        )
    })?;

    Ok((id, inserted == 1))
}

fn map_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        participant_low: row.get(1)?,
        participant_high: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
