use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::error::Error;
use std::fmt;

use crate::session::FlashMessage;
use crate::templates::ErrorTemplate;

/// The primary error type for the application.
///
/// Expected, user-facing failures (missing topic, wrong owner, bad form input)
/// travel as [`AppError::Redirect`] and end up as a flash message on the next
/// page. Everything else renders a small HTML error page.
#[derive(Debug)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    Internal(anyhow::Error),
    /// For client errors due to invalid requests.
    BadRequest(String),
    /// For when a requested resource is not found.
    NotFound(String),
    /// For when the requester does not own the resource.
    Forbidden(String),
    /// For when a request conflicts with the current state of the server.
    Conflict(String),
    /// For when a service is temporarily unavailable.
    ServiceUnavailable(String),
    /// For errors related to database operations.
    Database(String),
    /// For when a client has sent too many requests in a given amount of time.
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
    /// For request bodies over the configured limit.
    PayloadTooLarge(String),
    /// Redirect to `to` and show `message` there.
    Redirect { to: String, message: String },
    /// For errors related to I/O operations.
    IoError(String),
    /// For template rendering failures.
    Template(String),
}

impl AppError {
    pub fn redirect(to: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Redirect { to: to.into(), message: message.into() }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::Redirect { to, message } => write!(f, "Redirect to {}: {}", to, message),
            AppError::IoError(msg) => write!(f, "I/O error: {}", msg),
            AppError::Template(msg) => write!(f, "Template error: {}", msg),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

fn error_page(status: StatusCode, message: String) -> Response {
    let page = ErrorTemplate { status: status.as_u16(), message };
    match askama::Template::render(&page) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page: {}", e);
            (status, "Something went wrong.").into_response()
        }
    }
}

fn internal_page(kind: &str, detail: &str) -> Response {
    let error_id = uuid::Uuid::new_v4();
    tracing::error!(%error_id, "{}: {}", kind, detail);
    error_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Something went wrong (error id {}).", error_id),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(e) => internal_page("Internal error", &format!("{:?}", e)),
            AppError::Database(msg) => internal_page("Database error", &msg),
            AppError::IoError(msg) => internal_page("I/O error", &msg),
            AppError::Template(msg) => internal_page("Template error", &msg),
            AppError::BadRequest(msg) => error_page(StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => error_page(StatusCode::NOT_FOUND, msg),
            AppError::Forbidden(msg) => error_page(StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => error_page(StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => error_page(StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::PayloadTooLarge(msg) => error_page(StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::RateLimited { retry_after_seconds } => {
                let mut res = error_page(
                    StatusCode::TOO_MANY_REQUESTS,
                    format!("Too many requests. Please retry after {} seconds.", retry_after_seconds),
                );
                res.headers_mut().insert(
                    axum::http::header::RETRY_AFTER,
                    axum::http::HeaderValue::from(retry_after_seconds),
                );
                res
            }
            AppError::Redirect { to, message } => {
                let mut res = Redirect::to(&to).into_response();
                res.extensions_mut().insert(FlashMessage(message));
                res
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::Conflict(db_err.message().to_string())
                } else {
                    AppError::Database(format!("Database error: {}", db_err.message()))
                }
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<askama::Error> for AppError {
    fn from(err: askama::Error) -> Self {
        AppError::Template(err.to_string())
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// Converts a missing row into a flash-and-redirect answer.
pub trait OptionExt<T> {
    /// `Some(T)` passes through, `None` becomes `AppError::Redirect { to, message }`.
    fn or_redirect(self, to: &str, message: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_redirect(self, to: &str, message: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::redirect(to, message))
    }
}
