use aura_core::AppState;
use aura_util::{snowflake, validation};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if !state.config.registration_enabled {
        return Err(ApiError::Forbidden);
    }
    validation::validate_display_name(&body.name)?;
    validation::validate_email(&body.email)?;
    validation::validate_password(&body.password)?;

    let email = body.email.trim().to_lowercase();
    if aura_db::users::get_user_by_email(&state.db, &email)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("email already registered".into()));
    }

    let password_hash = aura_core::auth::hash_password(&body.password)?;
    let user = aura_db::users::create_user(
        &state.db,
        snowflake::generate(state.config.worker_id),
        body.name.trim(),
        &email,
        &password_hash,
        Utc::now(),
    )
    .await?;
    let token = aura_core::auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user.into_public(), "token": token })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = body.email.trim().to_lowercase();
    let user = aura_db::users::get_user_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !aura_core::auth::verify_password(&body.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized);
    }
    let token = aura_core::auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )?;
    Ok(Json(json!({ "user": user.into_public(), "token": token })))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let profile = state.profiles.get(&state.db, auth.user_id).await?;
    Ok(Json(json!({ "user": profile })))
}
