use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: checks DB connectivity with timeout protection
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    // Add timeout to prevent hanging readiness checks
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    Json(snapshot)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let counters: [(&str, &str, u64); 11] = [
        ("users_registered", "Accounts registered", m.users_registered as u64),
        ("logins_succeeded", "Successful logins", m.logins_succeeded as u64),
        ("logins_failed", "Failed logins", m.logins_failed as u64),
        ("topics_created", "Topics created", m.topics_created as u64),
        ("topics_updated", "Topics updated", m.topics_updated as u64),
        ("topics_deleted", "Topics deleted", m.topics_deleted as u64),
        ("files_uploaded", "Files uploaded", m.files_uploaded as u64),
        ("bytes_uploaded", "Bytes uploaded", m.bytes_uploaded),
        ("resets_requested", "Password reset codes sent", m.resets_requested as u64),
        ("resets_completed", "Password resets completed", m.resets_completed as u64),
        ("accounts_deleted", "Accounts deleted", m.accounts_deleted as u64),
    ];
    let mut body = String::new();
    for (name, help, value) in counters {
        body.push_str(&format!(
            "# HELP chocoboard_{name} {help}\n# TYPE chocoboard_{name} counter\nchocoboard_{name} {value}\n"
        ));
    }
    body.push_str(&format!(
        "# HELP chocoboard_uptime_seconds Uptime seconds\n# TYPE chocoboard_uptime_seconds gauge\nchocoboard_uptime_seconds {}\n",
        m.uptime_seconds
    ));
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
