use std::sync::Arc;
use std::time::Duration;

use parley_db::Database;

use crate::completion::CompletionClient;
use crate::store::ThreadStore;
use crate::token::TokenCodec;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenCodec,
    pub threads: ThreadStore,
    pub completion: Arc<dyn CompletionClient>,
    /// Upper bound on a single completion call.
    pub completion_timeout: Duration,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        tokens: TokenCodec,
        completion: Arc<dyn CompletionClient>,
        completion_timeout: Duration,
    ) -> AppState {
        Arc::new(Self {
            threads: ThreadStore::new(db.clone()),
            db,
            tokens,
            completion,
            completion_timeout,
        })
    }
}
