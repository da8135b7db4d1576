use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The requested feed id is not in the registry.
    #[error("unknown feed: {requested}")]
    UnknownFeed {
        requested: String,
        available: Vec<String>,
    },

    /// Invalid request parameters.
    #[error("{0}")]
    BadRequest(String),

    /// The proxy token pair was never emitted by the rewriter.
    #[error("proxy target not allowlisted")]
    UnauthorizedProxyTarget,

    /// Network failure or non-2xx from the source feed.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// The feed document does not parse after bounding.
    #[error("malformed feed document: {0}")]
    MalformedFeed(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// API error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::UnknownFeed {
                requested,
                available,
            } => (
                StatusCode::NOT_FOUND,
                format!("unknown feed: {}", requested),
                Some(format!("valid feed ids: {}", available.join(", "))),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::UnauthorizedProxyTarget => (
                StatusCode::FORBIDDEN,
                "proxy target not allowlisted".to_string(),
                None,
            ),
            AppError::UpstreamFetch(msg) => {
                tracing::error!("Upstream fetch error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream fetch failed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::MalformedFeed(msg) => {
                tracing::error!("Malformed feed document: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "feed document could not be processed".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = ErrorResponse {
            error: error_message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::UpstreamFetch(e.to_string())
    }
}

impl From<feedxml::FeedXmlError> for AppError {
    fn from(e: feedxml::FeedXmlError) -> Self {
        AppError::MalformedFeed(e.to_string())
    }
}

impl From<crate::token::TokenError> for AppError {
    fn from(e: crate::token::TokenError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}
