use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use exchange_core::{AssignmentEngine, ExchangeStatus, Pairing};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod wishlist;

pub use config::Config;
pub use directory::{Directory, SnapshotError};

use auth::{require_admin, require_user, UserView};
use directory::RosterEntry;
use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<AssignmentEngine<Directory>>,
    /// Session token -> user id. Memory only, so a restart logs everyone out.
    pub(crate) sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_directory(Directory::default())
    }
}

impl AppState {
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let state = Self::from_directory(Directory::with_persistence(path).await?);
        state.directory().persist().await;
        Ok(state)
    }

    fn from_directory(mut directory: Directory) -> Self {
        directory.initialize_event();
        Self {
            engine: Arc::new(AssignmentEngine::new(directory)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn directory(&self) -> &Directory {
        self.engine.store()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/secret/register", post(join_exchange))
        .route("/api/secret/me", get(my_friend))
        .route(
            "/api/wishlist/me",
            get(wishlist::get_mine).put(wishlist::put_mine),
        )
        .route("/api/wishlist/friend", get(wishlist::get_friend))
        .route("/api/admin/status", get(admin_status))
        .route("/api/admin/start", post(start_assignment))
        .route("/api/admin/reset", post(reset_assignments))
        .route("/api/admin/participants/:id", delete(remove_participant))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn join_exchange(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserView>, ApiError> {
    let user = require_user(&state, &headers).await?;
    let user = state.directory().opt_in(&user.id)?;
    state.directory().persist().await;
    Ok(Json(UserView::from(&user)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FriendView {
    full_name: String,
}

#[derive(Serialize)]
struct FriendResponse {
    friend: Option<FriendView>,
}

async fn my_friend(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FriendResponse>, ApiError> {
    let user = require_user(&state, &headers).await?;
    let friend = state
        .directory()
        .assigned_friend(&user.id)?
        .map(|full_name| FriendView { full_name });
    Ok(Json(FriendResponse { friend }))
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: ExchangeStatus,
    participants: Vec<RosterEntry>,
}

async fn admin_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let status = state.engine.status()?;
    let participants = state.directory().roster()?;
    Ok(Json(StatusResponse {
        status,
        participants,
    }))
}

#[derive(Deserialize)]
struct StartParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct StartResponse {
    assignments: Vec<Pairing>,
}

async fn start_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Result<Json<StartResponse>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    let mut rng = params
        .seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);
    let assignments = state.engine.perform_assignment(&mut rng)?;
    state.directory().persist().await;
    info!(admin = %admin.id, pairs = assignments.len(), "assignment requested");
    Ok(Json(StartResponse { assignments }))
}

async fn reset_assignments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers).await?;
    state.engine.reset_assignments()?;
    state.directory().persist().await;
    Ok(Json(serde_json::json!({
        "message": "system has been reset successfully"
    })))
}

async fn remove_participant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers).await?;
    let removed = state.directory().remove_participant(&user_id)?;
    state
        .sessions
        .write()
        .await
        .retain(|_, owner| owner != &removed.id);
    state.directory().persist().await;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "participant deleted successfully" })),
    ))
}
