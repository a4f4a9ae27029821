pub mod auth;
pub mod chat;
pub mod completion;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod state;
pub mod store;
pub mod threads;
pub mod token;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware as mw,
    routing::{get, post},
};

use parley_types::api::ErrorBody;

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;

/// All HTTP routes with their auth policy applied. Transport layers (CORS,
/// tracing) are added by the server.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/ping", get(ping));

    let chat_routes = Router::new()
        .route("/api/chat", post(chat::send))
        .route_layer(mw::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route("/api/thread", get(threads::list_threads))
        .route(
            "/api/thread/{thread_id}",
            get(threads::get_thread).delete(threads::delete_thread),
        )
        .route_layer(mw::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(chat_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Not found".into(),
        }),
    )
}

async fn method_not_allowed() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: "Method not allowed".into(),
        }),
    )
}
