use crate::Database;
use crate::models::{MessageRow, NewMessage, ThreadRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Returns false, writing nothing, when the username is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO NOTHING",
                (id, username, password_hash),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Threads --
    //
    // Every thread query is keyed by owner. There is deliberately no lookup
    // by thread_id alone.

    /// All threads of one owner, most recently updated first.
    pub fn list_threads(&self, owner_id: &str) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, owner_id, title, created_at, updated_at
                 FROM threads
                 WHERE owner_id = ?1
                 ORDER BY updated_at DESC, id DESC",
            )?;

            let rows = stmt
                .query_map([owner_id], map_thread_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Messages of every thread owned by `owner_id`, in append order.
    /// One query for the whole listing instead of one per thread.
    pub fn get_messages_for_owner(&self, owner_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.thread_pk, m.role, m.content
                 FROM thread_messages m
                 JOIN threads t ON t.id = m.thread_pk
                 WHERE t.owner_id = ?1
                 ORDER BY m.id ASC",
            )?;

            let rows = stmt
                .query_map([owner_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Thread header plus its messages, or `None` when `(thread_id, owner_id)`
    /// does not exist.
    pub fn find_thread(
        &self,
        owner_id: &str,
        thread_id: &str,
    ) -> Result<Option<(ThreadRow, Vec<MessageRow>)>> {
        self.with_conn(|conn| {
            let Some(thread) = query_thread(conn, owner_id, thread_id)? else {
                return Ok(None);
            };
            let messages = query_thread_messages(conn, thread.pk)?;
            Ok(Some((thread, messages)))
        })
    }

    /// Returns true if a thread was removed. Messages go with it via cascade.
    pub fn delete_thread(&self, owner_id: &str, thread_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM threads WHERE owner_id = ?1 AND thread_id = ?2",
                (owner_id, thread_id),
            )?;
            Ok(removed > 0)
        })
    }

    /// Creates the thread if needed, refreshes `updated_at` and appends
    /// `messages`, all in one transaction.
    ///
    /// `title` is only written when the thread is created. Concurrent calls
    /// for the same key each append their own rows, so no exchange is lost.
    pub fn append_messages(
        &self,
        owner_id: &str,
        thread_id: &str,
        title: &str,
        created_at: &str,
        updated_at: &str,
        messages: &[NewMessage<'_>],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO threads (thread_id, owner_id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(owner_id, thread_id) DO UPDATE SET updated_at = excluded.updated_at",
                (thread_id, owner_id, title, created_at, updated_at),
            )?;

            let thread_pk: i64 = tx.query_row(
                "SELECT id FROM threads WHERE owner_id = ?1 AND thread_id = ?2",
                (owner_id, thread_id),
                |row| row.get(0),
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO thread_messages (thread_pk, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for message in messages {
                    stmt.execute(rusqlite::params![
                        thread_pk,
                        message.role,
                        message.content,
                        updated_at
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }
}

fn map_thread_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        pk: row.get(0)?,
        thread_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        thread_pk: row.get(0)?,
        role: row.get(1)?,
        content: row.get(2)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_thread(conn: &Connection, owner_id: &str, thread_id: &str) -> Result<Option<ThreadRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, thread_id, owner_id, title, created_at, updated_at
         FROM threads
         WHERE owner_id = ?1 AND thread_id = ?2",
    )?;

    let row = stmt
        .query_row((owner_id, thread_id), map_thread_row)
        .optional()?;

    Ok(row)
}

fn query_thread_messages(conn: &Connection, thread_pk: i64) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT thread_pk, role, content FROM thread_messages WHERE thread_pk = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([thread_pk], map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
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
