use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::directory::{Role, UserRecord};
use crate::error::ApiError;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-token";

const MIN_PASSWORD_LEN: usize = 6;
const MAX_NAME_LEN: usize = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Credentials {
    full_name: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserView {
    id: String,
    full_name: String,
    role: Role,
    participating: bool,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            participating: user.participating,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct AuthResponse {
    token: String,
    user: UserView,
}

/// Collapses whitespace runs and trims.
pub fn normalize_full_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn validate_full_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::Validation("full name is required".into()));
    }
    let words: Vec<&str> = name.split(' ').collect();
    if words.len() < 2 {
        return Err(ApiError::Validation(
            "please enter your full name (first and last name)".into(),
        ));
    }
    for word in &words {
        if word.chars().count() < 2 {
            return Err(ApiError::Validation(
                "each part of your name must be at least 2 characters long".into(),
            ));
        }
        if !word
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '.' || c == '-')
        {
            return Err(ApiError::Validation(
                "name can only contain letters, dots, and hyphens".into(),
            ));
        }
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ApiError::Validation(
            "full name is too long (maximum 50 characters)".into(),
        ));
    }
    Ok(())
}

pub fn hash_password(salt: &str, password: &str) -> String {
    Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

pub(crate) async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<UserRecord, ApiError> {
    let token = session_token(headers).ok_or(ApiError::Unauthenticated)?;
    let user_id = state
        .sessions
        .read()
        .await
        .get(token)
        .cloned()
        .ok_or(ApiError::Unauthenticated)?;
    state
        .directory()
        .user(&user_id)
        .map_err(|_| ApiError::Unauthenticated)
}

pub(crate) async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<UserRecord, ApiError> {
    let user = require_user(state, headers).await?;
    if user.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

async fn open_session(state: &AppState, user_id: &str) -> String {
    let token = Uuid::new_v4().to_string();
    state
        .sessions
        .write()
        .await
        .insert(token.clone(), user_id.to_string());
    token
}

pub(crate) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let full_name = normalize_full_name(&payload.full_name);
    validate_full_name(&full_name)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "password must be at least 6 characters long".into(),
        ));
    }

    let salt = Uuid::new_v4().simple().to_string();
    let password_hash = hash_password(&salt, &payload.password);
    let user = state
        .directory()
        .insert_user(full_name, password_hash, salt)?;
    let token = open_session(&state, &user.id).await;
    state.directory().persist().await;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserView::from(&user),
        }),
    ))
}

pub(crate) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(payload) = payload?;
    let full_name = normalize_full_name(&payload.full_name);
    let user = state
        .directory()
        .find_by_name(&full_name)?
        .ok_or(ApiError::UnknownUser)?;
    if hash_password(&user.salt, &payload.password) != user.password_hash {
        return Err(ApiError::WrongPassword);
    }
    let token = open_session(&state, &user.id).await;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(AuthResponse {
        token,
        user: UserView::from(&user),
    }))
}

pub(crate) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.write().await.remove(token);
    }
    Json(serde_json::json!({ "message": "logged out successfully" }))
}

pub(crate) async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserView>, ApiError> {
    let user = require_user(&state, &headers).await?;
    Ok(Json(UserView::from(&user)))
}
