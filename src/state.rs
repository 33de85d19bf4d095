use std::{sync::Arc, time::Duration};

use crate::config::AppConfig;
use crate::mail::{self, Mailer};
use crate::metrics::Metrics;
use crate::middleware::EndpointRateLimiter;
use crate::password::Passwords;
use crate::session::SessionStore;
use crate::uploads::UploadStore;

/// The shared application state.
///
/// Cloned into every handler by Axum; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: sqlx::SqlitePool,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Server-side session data keyed by cookie id.
    pub sessions: SessionStore,
    /// Argon2 hasher for account passwords and secret-topic keys.
    pub passwords: Passwords,
    /// Attachment and profile image directory.
    pub uploads: UploadStore,
    /// Transport for password reset codes.
    pub mailer: Arc<dyn Mailer>,
    /// The application metrics.
    pub metrics: Metrics,
    /// The per-endpoint rate limiter.
    ///
    /// Guards the endpoints that are attractive for guessing: login,
    /// registration, reset requests and code verification.
    pub rate_limiter: EndpointRateLimiter,
}

impl AppState {
    /// Creates a new `AppState`, building the mail transport from the config.
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> anyhow::Result<Self> {
        let mailer = mail::from_config(&config.mail)?;
        Self::with_mailer(db, config, mailer)
    }

    /// Like [`AppState::new`] with an explicit mail transport.
    pub fn with_mailer(db: sqlx::SqlitePool, config: AppConfig, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/auth/login", 20, 60),          // 20 login attempts per minute
            ("/auth/register", 10, 60),       // 10 registrations per minute
            ("/auth/reset_password", 5, 60),  // 5 reset mails per minute
            ("/auth/verify", 20, 60),         // 20 code guesses per minute
        ]);

        Ok(Self {
            db,
            sessions: SessionStore::new(Duration::from_secs(config.session.idle_timeout_secs)),
            passwords: Passwords::new(&config.auth)?,
            uploads: UploadStore::new(config.uploads.dir.clone(), config.uploads.max_file_size),
            config: Arc::new(config),
            mailer,
            metrics: Metrics::new(),
            rate_limiter,
        })
    }
}
