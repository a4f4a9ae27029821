use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, warn};

use parley_db::Database;
use parley_db::models::{MessageRow, NewMessage, ThreadRow};
use parley_types::models::{ChatMessage, Role, Thread};

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;

/// Owner-scoped access to threads.
///
/// Every operation takes the caller's identity and addresses threads by
/// `(thread_id, owner)`. A thread owned by someone else is reported exactly
/// like one that does not exist.
#[derive(Clone)]
pub struct ThreadStore {
    db: Arc<Database>,
}

impl ThreadStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Threads owned by the caller, most recently updated first.
    pub fn list_threads(&self, identity: &Identity) -> ApiResult<Vec<Thread>> {
        let owner = owner_of(identity)?;

        let rows = self.db.list_threads(owner)?;
        let message_rows = self.db.get_messages_for_owner(owner)?;

        let mut by_thread: HashMap<i64, Vec<MessageRow>> = HashMap::new();
        for m in message_rows {
            by_thread.entry(m.thread_pk).or_default().push(m);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let messages = by_thread.remove(&row.pk).unwrap_or_default();
                to_thread(row, messages)
            })
            .collect())
    }

    pub fn get_thread(&self, identity: &Identity, thread_id: &str) -> ApiResult<Thread> {
        let owner = owner_of(identity)?;

        let (row, messages) = self
            .db
            .find_thread(owner, thread_id)?
            .ok_or(ApiError::NotFound)?;

        Ok(to_thread(row, messages))
    }

    pub fn delete_thread(&self, identity: &Identity, thread_id: &str) -> ApiResult<()> {
        let owner = owner_of(identity)?;

        if self.db.delete_thread(owner, thread_id)? {
            Ok(())
        } else {
            Err(ApiError::NotFound)
        }
    }

    /// Load the caller's thread, or start a new one titled after `text`, and
    /// append `text` as a user message. Nothing is written here; see
    /// `persist_exchange`.
    pub fn upsert_for_message(
        &self,
        identity: &Identity,
        thread_id: &str,
        text: &str,
    ) -> ApiResult<Thread> {
        let owner = owner_of(identity)?;

        match self.db.find_thread(owner, thread_id)? {
            Some((row, messages)) => {
                let mut thread = to_thread(row, messages);
                thread.messages.push(ChatMessage::user(text));
                Ok(thread)
            }
            None => Ok(Thread::started_by(thread_id, owner, text)),
        }
    }

    /// Write the trailing user message and assistant reply of `thread` in a
    /// single transaction, creating the thread if this is its first exchange.
    pub fn persist_exchange(&self, thread: &Thread) -> ApiResult<()> {
        let exchange = match thread.messages.as_slice() {
            [.., user, reply] if user.role == Role::User && reply.role == Role::Assistant => {
                [user, reply]
            }
            _ => {
                error!(
                    "Thread {} has no trailing user/assistant pair to persist",
                    thread.thread_id
                );
                return Err(anyhow::anyhow!("incomplete exchange").into());
            }
        };

        let new_messages: Vec<NewMessage<'_>> = exchange
            .iter()
            .map(|m| NewMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        self.db.append_messages(
            &thread.owner_id,
            &thread.thread_id,
            &thread.title,
            &timestamp(thread.created_at),
            &timestamp(thread.updated_at),
            &new_messages,
        )?;

        Ok(())
    }
}

/// Run a blocking store call off the async runtime.
pub async fn run_blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}

fn owner_of(identity: &Identity) -> ApiResult<&str> {
    identity.user_id().ok_or(ApiError::Unauthorized)
}

/// Fixed-width UTC so that text ordering in SQLite matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str, field: &str, thread_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on thread '{}': {}", field, raw, thread_id, e);
            DateTime::default()
        })
}

fn to_thread(row: ThreadRow, messages: Vec<MessageRow>) -> Thread {
    let messages = messages
        .into_iter()
        .filter_map(|m| match m.role.parse::<Role>() {
            Ok(role) => Some(ChatMessage {
                role,
                content: m.content,
            }),
            Err(e) => {
                warn!("Skipping message on thread '{}': {}", row.thread_id, e);
                None
            }
        })
        .collect();

    Thread {
        created_at: parse_timestamp(&row.created_at, "created_at", &row.thread_id),
        updated_at: parse_timestamp(&row.updated_at, "updated_at", &row.thread_id),
        thread_id: row.thread_id,
        owner_id: row.owner_id,
        title: row.title,
        messages,
    }
}
