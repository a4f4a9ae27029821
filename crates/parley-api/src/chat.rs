use axum::{Extension, Json, extract::State, extract::rejection::JsonRejection};
use chrono::Utc;
use tracing::{debug, info};

use parley_types::api::{ChatRequest, ChatResponse};
use parley_types::models::ChatMessage;

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;
use crate::state::{AppState, AppStateInner};
use crate::store::run_blocking;

/// POST /api/chat, open to guests. Only authenticated callers get their
/// exchange stored.
pub async fn send(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(req) = payload?;
    debug!(
        "Chat request: thread={:?} guest={}",
        req.thread_id,
        identity.user_id().is_none()
    );

    let reply = handle_chat_send(
        &state,
        &identity,
        req.thread_id.as_deref(),
        req.message.as_deref(),
    )
    .await?;

    Ok(Json(ChatResponse { reply }))
}

/// Relay one user message to the assistant and return its reply.
///
/// For an authenticated caller the thread is loaded (or started) before the
/// upstream call and the user message plus reply are written together
/// afterwards, so a failed call leaves no trace. Guests skip storage
/// entirely.
pub async fn handle_chat_send(
    state: &AppStateInner,
    identity: &Identity,
    thread_id: Option<&str>,
    message: Option<&str>,
) -> ApiResult<String> {
    let message = match message {
        Some(m) if !m.trim().is_empty() => m,
        _ => return Err(ApiError::Validation("Message is required".into())),
    };

    let thread = match identity {
        Identity::Authenticated(_) => {
            let thread_id = match thread_id {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => return Err(ApiError::Validation("threadId is required".into())),
            };

            let store = state.threads.clone();
            let who = identity.clone();
            let text = message.to_string();
            let thread =
                run_blocking(move || store.upsert_for_message(&who, &thread_id, &text)).await?;
            Some(thread)
        }
        Identity::Guest => None,
    };

    let reply = tokio::time::timeout(
        state.completion_timeout,
        state.completion.generate_reply(message),
    )
    .await
    .map_err(|_| {
        ApiError::Upstream(format!(
            "no reply within {}s",
            state.completion_timeout.as_secs_f32()
        ))
    })?
    .map_err(|e| ApiError::Upstream(format!("{:#}", e)))?;

    if reply.is_empty() {
        return Err(ApiError::Upstream("empty reply".into()));
    }

    if let Some(mut thread) = thread {
        thread.messages.push(ChatMessage::assistant(reply.clone()));
        thread.updated_at = Utc::now();

        let store = state.threads.clone();
        let thread_id = thread.thread_id.clone();
        run_blocking(move || store.persist_exchange(&thread)).await?;
        info!("Stored exchange on thread {}", thread_id);
    }

    Ok(reply)
}
