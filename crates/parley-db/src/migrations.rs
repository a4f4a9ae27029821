use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- owner_id is not a foreign key: tokens may be issued by another
        -- service, so an owner need not have a row in users.
        CREATE TABLE IF NOT EXISTS threads (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id   TEXT NOT NULL,
            owner_id    TEXT NOT NULL,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(owner_id, thread_id)
        );

        CREATE INDEX IF NOT EXISTS idx_threads_owner_updated
            ON threads(owner_id, updated_at);

        CREATE TABLE IF NOT EXISTS thread_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_pk   INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_thread_messages_thread
            ON thread_messages(thread_pk, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
