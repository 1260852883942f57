use super::state::AppState;
use axum::{
    Json,
    extract::{
        OriginalUri, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashboard_core::{export::ExportError, txn::TxnError};
use serde::Serialize;
use serde_json::json;
use std::{any::Any, error::Error as _};

/// Every way a request can fail.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("Route {0} not found")]
    RouteNotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Transaction(#[from] TxnError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("{0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Validation(format!("Upload error: {}", err.body_text()))
    }
}

/// Internal description of a failed request, carried as a response
/// extension until [`render_error_detail`] decides whether to show it.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    pub status: &'static str,
    pub message: String,
    pub detail: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound { .. } | Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(err) => match err {
                sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
                sqlx::Error::Database(db)
                    if db.is_unique_violation()
                        || db.is_foreign_key_violation()
                        || db.is_check_violation() =>
                {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Export(
                ExportError::UnsupportedDataSource { .. } | ExportError::InvalidConfig { .. },
            ) => StatusCode::BAD_REQUEST,
            Self::Transaction(_)
            | Self::Export(_)
            | Self::TransactionClosed
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to clients. Server errors never leak internals.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_)
            | Self::Unauthorized(_)
            | Self::Conflict(_)
            | Self::NotFound { .. }
            | Self::RouteNotFound(_)
            | Self::Export(
                ExportError::UnsupportedDataSource { .. } | ExportError::InvalidConfig { .. },
            ) => self.to_string(),
            Self::Database(err) => match err {
                sqlx::Error::RowNotFound => "Resource not found".to_owned(),
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    "Duplicate field value".to_owned()
                }
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    "Foreign key constraint error".to_owned()
                }
                sqlx::Error::Database(db) if db.is_check_violation() => {
                    "Invalid field value".to_owned()
                }
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    "Database connection error".to_owned()
                }
                _ => "Database operation failed".to_owned(),
            },
            Self::Export(_) => "Failed to export data".to_owned(),
            Self::Transaction(_) | Self::TransactionClosed | Self::Internal(_) => {
                "Internal server error".to_owned()
            }
        }
    }

    /// The full error chain, for logs and development responses.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport {
            status: if status.is_client_error() {
                "fail"
            } else {
                "error"
            },
            message: self.public_message(),
            detail: self.detail(),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %report.detail, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %report.detail, "request rejected");
        }

        let body = Json(json!({ "status": report.status, "message": report.message }));
        let mut response = (status, body).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Adds the internal error chain to error bodies in development.
pub async fn render_error_detail(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.config.profile.is_development() {
        return response;
    }
    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };
    let mut rendered = (response.status(), Json(report)).into_response();
    *rendered.extensions_mut() = response.into_parts().0.extensions;
    rendered
}

pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::RouteNotFound(uri.path().to_owned())
}

/// Turns a handler panic into the regular 500 body.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());
    AppError::Internal(format!("handler panicked: {reason}")).into_response()
}
