use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// StoreError
///
/// Failures raised by the document store and the CRUD layer above it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("document has no `{0}` field")]
    MissingKey(String),
}

/// AppError
///
/// Every failure a handler or extractor can surface. Each variant maps to a fixed
/// HTTP status and `detail` message in `into_response`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, expired or wrongly signed bearer token.
    #[error("Could not validate credentials.")]
    InvalidCredentials,
    /// The token is valid but its subject no longer exists.
    #[error("User not found.")]
    UserNotFound,
    #[error("User with this email already exists.")]
    UserAlreadyExists,
    #[error("Incorrect email or password.")]
    IncorrectLogin,
    #[error("Table not found.")]
    TableNotFound,
    #[error("{0}")]
    Validation(String),
    /// A body, form, path or query the framework could not parse; keeps axum's status.
    #[error("{detail}")]
    BadRequest { status: StatusCode, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::UserNotFound | AppError::TableNotFound => StatusCode::NOT_FOUND,
            AppError::UserAlreadyExists => StatusCode::CONFLICT,
            AppError::IncorrectLogin => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest { status, .. } => *status,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// --- Extractor Rejections ---

macro_rules! from_rejection {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for AppError {
                fn from(rejection: $rejection) -> Self {
                    AppError::BadRequest {
                        status: rejection.status(),
                        detail: rejection.body_text(),
                    }
                }
            }
        )+
    };
}

from_rejection!(JsonRejection, FormRejection, PathRejection, QueryRejection);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details go to the log, never to the client.
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
