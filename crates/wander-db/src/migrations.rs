use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            participant_low   INTEGER NOT NULL REFERENCES users(id),
            participant_high  INTEGER NOT NULL REFERENCES users(id),
            created_at        TEXT NOT NULL,
            CHECK (participant_low < participant_high),
            UNIQUE (participant_low, participant_high)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_high
            ON conversations(participant_high);

        CREATE TABLE IF NOT EXISTS messages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
            sender_id        INTEGER NOT NULL REFERENCES users(id),
            content          TEXT NOT NULL,
            sent_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, sent_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id      INTEGER NOT NULL REFERENCES users(id),
            message      TEXT NOT NULL,
            link_url     TEXT,
            is_read      INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
