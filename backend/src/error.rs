use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exchange_core::EngineError;
use serde::Serialize;
use thiserror::Error;

use crate::directory::DirectoryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("please log in to continue")]
    Unauthenticated,
    #[error("admin access required")]
    Forbidden,
    #[error("user not found, check your name or register if you're new")]
    UnknownUser,
    #[error("incorrect password, please try again")]
    WrongPassword,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: &'static str,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "ADMIN_REQUIRED"),
            ApiError::UnknownUser => (StatusCode::UNAUTHORIZED, "USER_NOT_FOUND"),
            ApiError::WrongPassword => (StatusCode::UNAUTHORIZED, "INCORRECT_PASSWORD"),
            ApiError::Directory(err) => match err {
                DirectoryError::NameTaken => (StatusCode::CONFLICT, "USER_EXISTS"),
                DirectoryError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                DirectoryError::EventLocked => (StatusCode::CONFLICT, "EVENT_LOCKED"),
                DirectoryError::AlreadyParticipating => {
                    (StatusCode::CONFLICT, "ALREADY_PARTICIPATING")
                }
                DirectoryError::AssignmentsDone => (StatusCode::CONFLICT, "ASSIGNMENTS_DONE"),
                DirectoryError::CannotRemoveAdmin => (StatusCode::BAD_REQUEST, "ADMIN_PROTECTED"),
                DirectoryError::NoAssignedFriend => (StatusCode::NOT_FOUND, "NO_ASSIGNED_FRIEND"),
                DirectoryError::FriendNotFound => (StatusCode::NOT_FOUND, "FRIEND_NOT_FOUND"),
                DirectoryError::NotInitialized => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "NOT_INITIALIZED")
                }
                DirectoryError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            },
            ApiError::Engine(err) => match err {
                EngineError::InsufficientParticipants { .. } => {
                    (StatusCode::BAD_REQUEST, "INSUFFICIENT_PARTICIPANTS")
                }
                EngineError::ConcurrentAssignmentInProgress => {
                    (StatusCode::CONFLICT, "ASSIGNMENT_IN_PROGRESS")
                }
                EngineError::NotInitialized => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "NOT_INITIALIZED")
                }
                EngineError::MissingFriend(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_ASSIGNMENT")
                }
                EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        } else {
            tracing::debug!(error = %self, code, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
                code,
            }),
        )
            .into_response()
    }
}
