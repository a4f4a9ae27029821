use axum::{
    Extension, Json,
    extract::{Path, State},
};

use parley_types::api::DeleteThreadResponse;
use parley_types::models::{ChatMessage, Thread};

use crate::error::ApiResult;
use crate::identity::Identity;
use crate::state::AppState;
use crate::store::run_blocking;

/// GET /api/thread: the caller's threads, newest first.
pub async fn list_threads(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Thread>>> {
    let store = state.threads.clone();
    let threads = run_blocking(move || store.list_threads(&identity)).await?;
    Ok(Json(threads))
}

/// GET /api/thread/{thread_id}: the messages of one of the caller's threads.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let store = state.threads.clone();
    let thread = run_blocking(move || store.get_thread(&identity, &thread_id)).await?;
    Ok(Json(thread.messages))
}

/// DELETE /api/thread/{thread_id}
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<DeleteThreadResponse>> {
    let store = state.threads.clone();
    run_blocking(move || store.delete_thread(&identity, &thread_id)).await?;

    Ok(Json(DeleteThreadResponse {
        success: "Thread deleted successfully".into(),
    }))
}
