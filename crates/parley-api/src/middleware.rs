use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::identity::{self, AuthRequirement};
use crate::state::AppState;

/// Reject the request unless it carries a usable bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, req, next, AuthRequirement::Required).await
}

/// Attach an identity, falling back to `Identity::Guest`.
pub async fn optional_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authenticate(&state, req, next, AuthRequirement::Optional).await
}

async fn authenticate(
    state: &AppState,
    mut req: Request,
    next: Next,
    requirement: AuthRequirement,
) -> Result<Response, ApiError> {
    // A header that is not valid UTF-8 counts as present but malformed
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or_default());

    let identity = identity::resolve(&state.tokens, auth_header, requirement)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
