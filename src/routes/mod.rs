//! HTTP route handlers for the board.
//!
//! - `board`: the paginated topic listing
//! - `auth`: registration, login, account lookup and password reset
//! - `topic`: reading, writing, attachments and search
//! - `user`: profiles, profile images and account deletion
//! - `health`: liveness, readiness, metrics and version endpoints

use std::path::PathBuf;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::session::session_middleware;
use crate::state::AppState;

pub mod auth;
pub mod board;
pub mod health;
pub mod topic;
pub mod user;

const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// All application routes with the session layer and the upload-sized body
/// limit. Outer layers (tracing, compression, headers) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(board::index))
        .route("/auth/register", get(auth::register_page).post(auth::register))
        .route("/auth/login", get(auth::login_page).post(auth::login))
        .route("/auth/logout", get(auth::logout))
        .route("/auth/find_account", get(auth::find_account_page).post(auth::find_account))
        .route("/auth/reset_password", get(auth::reset_password_page).post(auth::reset_password))
        .route("/auth/verify", get(auth::verify_page).post(auth::verify))
        .route("/auth/change_password", get(auth::change_password_page).post(auth::change_password))
        .route("/topic/read/{id}", get(topic::read).post(topic::unlock))
        .route("/topic/create", get(topic::create_page).post(topic::create))
        .route("/topic/update/{id}", get(topic::update_page).post(topic::update))
        .route("/topic/delete/{id}", post(topic::delete))
        .route("/topic/download/{id}", get(topic::download))
        .route("/topic/search", get(topic::search))
        .route("/user/profile/edit", get(user::profile_edit_page).post(user::profile_edit))
        .route("/user/profile/{user_id}", get(user::profile))
        .route("/user/avatar/{user_id}", get(user::avatar))
        .route("/user/delete_account", get(user::delete_account_page).post(user::delete_account))
        .layer(from_fn_with_state(state.clone(), session_middleware));

    let ops = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version));

    let max_body_size = state.config.max_body_size();
    pages
        .merge(ops)
        .nest_service("/static", ServeDir::new(static_dir()))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Prefers `<exe_dir>/static` when deployed next to the binary, otherwise the
/// source tree.
fn static_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("static")))
        .filter(|d| d.is_dir())
        .unwrap_or_else(|| PathBuf::from(STATIC_DIR))
}

/// Percent-encodes a user-chosen value for use as one path segment, so
/// redirects to it stay valid header values.
pub(crate) fn path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
