#[cfg(test)]
mod tests {
    use crate::error::{AppError, AppResult, OptionExt};
    use crate::session::FlashMessage;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use std::io;

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::BadRequest("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Bad request: Invalid input");

        let error = AppError::NotFound("No profile image.".to_string());
        assert_eq!(format!("{}", error), "Not found: No profile image.");

        let error = AppError::RateLimited { retry_after_seconds: 60 };
        assert_eq!(format!("{}", error), "Rate limited. Retry after 60 seconds");

        let error = AppError::redirect("/", "No such user.");
        assert_eq!(format!("{}", error), "Redirect to /: No such user.");
    }

    #[test]
    fn test_app_error_into_response() {
        let cases = [
            (AppError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (AppError::Forbidden("not yours".into()), StatusCode::FORBIDDEN),
            (AppError::Conflict("taken".into()), StatusCode::CONFLICT),
            (AppError::ServiceUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::PayloadTooLarge("big".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::Database("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::RateLimited { retry_after_seconds: 30 }, StatusCode::TOO_MANY_REQUESTS),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_error_page_shows_message() {
        let response = AppError::NotFound("No profile image.".into()).into_response();
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"));
        let body = body_text(response).await;
        assert!(body.contains("404"));
        assert!(body.contains("No profile image."));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response = AppError::Database("no such table: users".into()).into_response();
        let body = body_text(response).await;
        assert!(!body.contains("no such table"));
        assert!(body.contains("error id"));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_seconds: 42 }.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_redirect_carries_flash() {
        let mut response = AppError::redirect("/auth/login", "Please sign in first.").into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
        let flash = response.extensions_mut().remove::<FlashMessage>().unwrap();
        assert_eq!(flash.0, "Please sign in first.");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        match AppError::from(io_error) {
            AppError::IoError(msg) => {
                assert!(msg.contains("not found") || msg.contains("NotFound"));
                assert!(msg.contains("File not found"));
            }
            other => panic!("Expected IoError variant, got {:?}", other),
        }
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unique_violation_becomes_conflict() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE t (v TEXT UNIQUE)").execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES ('a')").execute(&pool).await.unwrap();
        let err = sqlx::query("INSERT INTO t (v) VALUES ('a')").execute(&pool).await.unwrap_err();
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[test]
    fn test_option_ext() {
        let result: AppResult<i32> = Some(42).or_redirect("/", "This topic does not exist.");
        assert_eq!(result.unwrap(), 42);

        let result: AppResult<i32> = None.or_redirect("/", "This topic does not exist.");
        match result.unwrap_err() {
            AppError::Redirect { to, message } => {
                assert_eq!(to, "/");
                assert_eq!(message, "This topic does not exist.");
            }
            other => panic!("Expected Redirect, got {:?}", other),
        }
    }
}
