#[cfg(test)]
mod tests {
    use crate::db;
    use sqlx::migrate::MigrateDatabase;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;
    use tempfile::TempDir;

    async fn setup_test_db() -> (sqlx::SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", temp_dir.path().join("board.db").display());

        sqlx::Sqlite::create_database(&db_url).await.unwrap();

        // One connection so the foreign_keys pragma from init_db applies everywhere
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&db_url).await.unwrap();

        db::init_db(&pool).await.unwrap();

        (pool, temp_dir)
    }

    async fn insert_user(pool: &sqlx::SqlitePool, user_id: &str, mail: Option<&str>) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO users (user_id, password_hash, user_name, user_mail) VALUES (?1, 'x', 'Name', ?2)")
            .bind(user_id)
            .bind(mail)
            .execute(pool)
            .await
            .map(|_| ())
    }

    async fn insert_topic(pool: &sqlx::SqlitePool, author: &str) -> i64 {
        sqlx::query("INSERT INTO topic (title, body, post_user_id, post_user_name) VALUES ('t', 'b', ?1, 'Name')")
            .bind(author)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_init_db() {
        let (pool, _dir) = setup_test_db().await;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"topic".to_string()));
        assert!(tables.contains(&"files".to_string()));
    }

    #[tokio::test]
    async fn test_init_db_is_idempotent() {
        let (pool, _dir) = setup_test_db().await;
        insert_user(&pool, "alice", None).await.unwrap();

        db::init_db(&pool).await.unwrap();

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.unwrap();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn test_topic_defaults() {
        let (pool, _dir) = setup_test_db().await;
        let id = insert_topic(&pool, "alice").await;

        let row = sqlx::query("SELECT is_secret, secret_key, created_at FROM topic WHERE id = ?1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(!row.get::<bool, _>("is_secret"));
        assert!(row.get::<Option<String>, _>("secret_key").is_none());
        assert!(!row.get::<String, _>("created_at").is_empty());
    }

    #[tokio::test]
    async fn test_user_id_and_mail_are_unique() {
        let (pool, _dir) = setup_test_db().await;
        insert_user(&pool, "alice", Some("a@example.com")).await.unwrap();

        let dup_id = insert_user(&pool, "alice", Some("other@example.com")).await.unwrap_err();
        assert!(dup_id.as_database_error().unwrap().is_unique_violation());

        let dup_mail = insert_user(&pool, "bob", Some("a@example.com")).await.unwrap_err();
        assert!(dup_mail.as_database_error().unwrap().is_unique_violation());

        // Accounts without a mail address do not collide
        insert_user(&pool, "carol", None).await.unwrap();
        insert_user(&pool, "dave", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_attachment_per_topic() {
        let (pool, _dir) = setup_test_db().await;
        let id = insert_topic(&pool, "alice").await;

        let insert = |name: &'static str| {
            sqlx::query("INSERT INTO files (topic_id, file_name, file_path) VALUES (?1, ?2, ?2)")
                .bind(id)
                .bind(name)
                .execute(&pool)
        };
        insert("a.txt").await.unwrap();
        assert!(insert("b.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let (pool, _dir) = setup_test_db().await;
        let id = insert_topic(&pool, "alice").await;

        sqlx::query("INSERT INTO files (topic_id, file_name, file_path) VALUES (?1, 'a.txt', '/tmp/a.txt')")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        sqlx::query("DELETE FROM topic WHERE id = ?1").bind(id).execute(&pool).await.unwrap();

        let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE topic_id = ?1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn test_attachment_needs_topic() {
        let (pool, _dir) = setup_test_db().await;
        let orphan = sqlx::query("INSERT INTO files (topic_id, file_name, file_path) VALUES (999, 'a.txt', 'a')")
            .execute(&pool)
            .await;
        assert!(orphan.is_err());
    }
}
