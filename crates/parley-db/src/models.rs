/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ThreadRow {
    pub pk: i64,
    pub thread_id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub thread_pk: i64,
    pub role: String,
    pub content: String,
}

/// A message about to be appended to a thread.
pub struct NewMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}
