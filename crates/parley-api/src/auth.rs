use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use parley_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::run_blocking;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let Json(req) = payload?;

    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::Validation(
            "Username must be 3 to 32 characters".into(),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }

    let db = state.db.clone();
    let username = req.username.clone();
    let user_id = run_blocking(move || {
        // Skip the hash for the common case; the insert below is what decides
        if db.get_user_by_username(&req.username)?.is_some() {
            return Err(taken());
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = Uuid::new_v4();
        if !db.create_user(&user_id.to_string(), &req.username, &password_hash)? {
            return Err(taken());
        }
        Ok(user_id)
    })
    .await?;

    let token = state.tokens.issue(&user_id.to_string())?;
    info!("Registered user {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(req) = payload?;

    let db = state.db.clone();
    let user = run_blocking(move || {
        let user = db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::InvalidCredentials)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
            anyhow::anyhow!("stored hash for {} is unreadable: {}", user.username, e)
        })?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidCredentials)?;

        Ok(user)
    })
    .await?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = state.tokens.issue(&user.id)?;

    Ok(Json(AuthResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn taken() -> ApiError {
    ApiError::Conflict("Username already taken".into())
}
