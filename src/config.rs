use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Take client addresses from `X-Forwarded-For`/`X-Real-IP`. Only enable
    /// behind a reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    pub dir: PathBuf,
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub idle_timeout_secs: u64,
    pub secure_cookie: bool,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub reset_code_ttl_secs: u64,
    pub reset_max_attempts: u32,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    pub page_size: i64,
    pub search_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub transport: String,
    pub sender_name: String,
    pub sender_address: String,
    pub outbox_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub uploads: UploadsConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub board: BoardConfig,
    pub mail: MailConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl AppConfig {
    /// Upper bound for a whole request body: one maximal upload plus room for
    /// the other multipart fields and boundaries.
    pub fn max_body_size(&self) -> usize {
        self.uploads.max_file_size.saturating_add(1024 * 1024)
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: chocoboard.toml (in CWD)
        .add_source(::config::File::with_name("chocoboard").required(false));

    if let Ok(custom_path) = std::env::var("CHOCOBOARD_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("CHOCOBOARD").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    if cfg.uploads.max_file_size == 0 {
        return Err(anyhow::anyhow!("uploads.max_file_size must be > 0"));
    }
    if cfg.uploads.dir.as_os_str().is_empty() {
        return Err(anyhow::anyhow!("uploads.dir must not be empty"));
    }

    if cfg.session.cookie_name.trim().is_empty() {
        return Err(anyhow::anyhow!("session.cookie_name must not be empty"));
    }
    if cfg.session.idle_timeout_secs == 0 {
        return Err(anyhow::anyhow!("session.idle_timeout_secs must be > 0"));
    }
    if cfg.session.cleanup_interval_secs == 0 {
        return Err(anyhow::anyhow!("session.cleanup_interval_secs must be > 0"));
    }

    if cfg.auth.reset_code_ttl_secs == 0 {
        return Err(anyhow::anyhow!("auth.reset_code_ttl_secs must be > 0"));
    }
    if cfg.auth.reset_max_attempts == 0 {
        return Err(anyhow::anyhow!("auth.reset_max_attempts must be > 0"));
    }
    // Argon2 requires at least 8 KiB per lane and one pass
    if cfg.auth.argon2_memory_kib < 8 {
        return Err(anyhow::anyhow!("auth.argon2_memory_kib must be >= 8"));
    }
    if cfg.auth.argon2_iterations == 0 {
        return Err(anyhow::anyhow!("auth.argon2_iterations must be > 0"));
    }

    if !(1..=100).contains(&cfg.board.page_size) {
        return Err(anyhow::anyhow!("board.page_size must be in 1..=100"));
    }
    if cfg.board.search_limit < 1 {
        return Err(anyhow::anyhow!("board.search_limit must be > 0"));
    }

    match cfg.mail.transport.as_str() {
        "log" | "outbox" => {}
        other => return Err(anyhow::anyhow!("unknown mail.transport: {}", other)),
    }
    if cfg.mail.sender_address.trim().is_empty() {
        return Err(anyhow::anyhow!("mail.sender_address must not be empty"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
