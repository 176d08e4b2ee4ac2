use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{error, warn};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to load dataset for '{0}'")]
    UpstreamUnavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User already exists")]
    UserExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}

impl ApiError {
    /// HTTP status for this error kind. Every route maps errors through here.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) | ApiError::UserExists | ApiError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UpstreamUnavailable(_)
            | ApiError::QueryFailed(_)
            | ApiError::Config(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client.
    ///
    /// Query failures carry the underlying SQLite message; local I/O and
    /// internal faults are reported generically.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::UpstreamUnavailable(_) => "Failed to load dataset".to_string(),
            ApiError::QueryFailed(err) => err.to_string(),
            ApiError::InvalidInput(reason) => reason.clone(),
            ApiError::UserExists | ApiError::InvalidCredentials => self.to_string(),
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

/// Account routes answer with `msg`, every other route with `error`.
#[derive(Debug, Serialize)]
enum ErrorBody {
    #[serde(rename = "error")]
    Error(String),
    #[serde(rename = "msg")]
    Msg(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            warn!("Request rejected: {self}");
        }

        let body = match self {
            ApiError::UserExists | ApiError::InvalidCredentials => {
                ErrorBody::Msg(self.user_message())
            }
            _ => ErrorBody::Error(self.user_message()),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
