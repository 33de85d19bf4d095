#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig};
    use std::env;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests that touch process environment run one at a time
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_temp_config(content: &str) -> NamedTempFile {
        let temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        fs::write(temp_file.path(), content).unwrap();
        temp_file
    }

    #[test]
    fn test_valid_config_does_not_error() {
        let _guard = env_guard();
        assert!(config::load().is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert!(!config.server.trust_proxy_headers);
        assert_eq!(config.database.url, "sqlite://data/chocoboard.db");
        assert_eq!(config.uploads.max_file_size, 30 * 1024 * 1024);
        assert_eq!(config.board.page_size, 10);
        assert_eq!(config.auth.reset_max_attempts, 5);
        assert_eq!(config.mail.transport, "log");
        assert!(!config.session.secure_cookie);
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_max_body_size_leaves_room_for_fields() {
        let config = AppConfig::default();
        assert!(config.max_body_size() > config.uploads.max_file_size);
    }

    #[test]
    fn test_invalid_server_port() {
        let _guard = env_guard();
        env::set_var("CHOCOBOARD__SERVER__PORT", "0");
        let result = config::load();
        env::remove_var("CHOCOBOARD__SERVER__PORT");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
    }

    #[test]
    fn test_config_from_env() {
        let _guard = env_guard();
        env::set_var("CHOCOBOARD__SERVER__HOST", "0.0.0.0");
        env::set_var("CHOCOBOARD__SERVER__PORT", "3000");
        env::set_var("CHOCOBOARD__BOARD__PAGE_SIZE", "25");

        let result = config::load();

        env::remove_var("CHOCOBOARD__SERVER__HOST");
        env::remove_var("CHOCOBOARD__SERVER__PORT");
        env::remove_var("CHOCOBOARD__BOARD__PAGE_SIZE");

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.board.page_size, 25);
    }

    #[test]
    fn test_config_from_file() {
        let _guard = env_guard();
        let temp_file = write_temp_config(
            r#"
[server]
host = "192.168.1.1"
port = 9000

[mail]
transport = "outbox"
outbox_dir = "/tmp/chocoboard-outbox"

[auth]
reset_code_ttl_secs = 120
"#,
        );
        env::set_var("CHOCOBOARD_CONFIG", temp_file.path().to_str().unwrap());

        let result = config::load();
        env::remove_var("CHOCOBOARD_CONFIG");

        let config = result.unwrap();
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.mail.transport, "outbox");
        assert_eq!(config.auth.reset_code_ttl_secs, 120);
        // Untouched sections keep the embedded defaults
        assert_eq!(config.board.search_limit, 200);
    }

    #[test]
    fn test_config_priority() {
        let _guard = env_guard();
        let temp_file = write_temp_config("[server]\nport = 7000\n");
        env::set_var("CHOCOBOARD_CONFIG", temp_file.path().to_str().unwrap());
        env::set_var("CHOCOBOARD__SERVER__PORT", "8888");

        let result = config::load();

        env::remove_var("CHOCOBOARD_CONFIG");
        env::remove_var("CHOCOBOARD__SERVER__PORT");

        // Environment variables override the file
        assert_eq!(result.unwrap().server.port, 8888);
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("subdir/test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        assert!(!db_path.parent().unwrap().exists());
        config::ensure_sqlite_parent_dir(&db_url).unwrap();
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn test_ensure_sqlite_parent_dir_non_sqlite() {
        assert!(config::ensure_sqlite_parent_dir("mysql://localhost/board").is_ok());
    }

    fn rejected(tweak: impl FnOnce(&mut AppConfig), expected: &str) {
        let mut config = AppConfig::default();
        tweak(&mut config);
        let err = config::validate(&config).unwrap_err().to_string();
        assert!(err.contains(expected), "expected '{}' in '{}'", expected, err);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        rejected(|c| c.uploads.max_file_size = 0, "uploads.max_file_size must be > 0");
        rejected(|c| c.session.cookie_name = " ".into(), "session.cookie_name must not be empty");
        rejected(|c| c.session.idle_timeout_secs = 0, "session.idle_timeout_secs must be > 0");
        rejected(|c| c.auth.reset_code_ttl_secs = 0, "auth.reset_code_ttl_secs must be > 0");
        rejected(|c| c.auth.reset_max_attempts = 0, "auth.reset_max_attempts must be > 0");
        rejected(|c| c.auth.argon2_memory_kib = 4, "auth.argon2_memory_kib must be >= 8");
        rejected(|c| c.board.page_size = 0, "board.page_size must be in 1..=100");
        rejected(|c| c.board.page_size = 101, "board.page_size must be in 1..=100");
        rejected(|c| c.board.search_limit = 0, "board.search_limit must be > 0");
        rejected(|c| c.mail.transport = "smtp".into(), "unknown mail.transport: smtp");
    }
}
