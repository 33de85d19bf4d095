//! Test harness: a router over a throwaway SQLite file and upload directory,
//! plus a cookie-keeping client that drives it with `oneshot`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::db;
use crate::mail::MemoryMailer;
use crate::routes::{build_router, path_segment};
use crate::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    pub dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.database.url = format!("sqlite://{}", dir.path().join("board.db").display());
    cfg.uploads.dir = dir.path().join("uploads");
    cfg.mail.outbox_dir = dir.path().join("outbox");
    // Fast hashing; the parameters are not what is under test
    cfg.auth.argon2_memory_kib = 64;
    cfg.auth.argon2_iterations = 1;
    tweak(&mut cfg);

    let options = SqliteConnectOptions::from_str(&cfg.database.url)
        .unwrap()
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await.unwrap();
    db::init_db(&pool).await.unwrap();

    let mailer = Arc::new(MemoryMailer::default());
    let state = AppState::with_mailer(pool, cfg, mailer.clone()).unwrap();
    let router = build_router(state.clone());
    TestApp { router, state, mailer, dir }
}

impl TestApp {
    pub fn client(&self) -> Client {
        Client {
            router: self.router.clone(),
            cookie_name: self.state.config.session.cookie_name.clone(),
            cookie: None,
        }
    }

    /// Registers and signs in a fresh account; returns its client.
    pub async fn user(&self, user_id: &str, password: &str, name: &str) -> Client {
        let mut client = self.client();
        let mail = format!("{}@example.com", user_id);
        let res = client.register(user_id, password, name, "Choco High", &mail).await;
        assert_eq!(res.location(), Some("/"), "registration of {} failed", user_id);
        let res = client.login(user_id, password).await;
        assert_eq!(res.location(), Some("/"), "login of {} failed", user_id);
        client
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.state.db).await.unwrap()
    }

    pub async fn last_mail_code(&self) -> String {
        let sent = self.mailer.sent.lock().await;
        let body = &sent.last().expect("no mail sent").body;
        let start = body.find('[').unwrap() + 1;
        let end = body.find(']').unwrap();
        body[start..end].to_string()
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect_to(&self, to: &str) -> bool {
        self.status == StatusCode::SEE_OTHER && self.location() == Some(to)
    }
}

pub struct Client {
    router: Router,
    cookie_name: String,
    cookie: Option<String>,
}

pub fn form_encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", path_segment(k), path_segment(v)))
        .collect::<Vec<_>>()
        .join("&")
}

impl Client {
    /// The session id this client currently presents.
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn use_session_cookie(&mut self, id: Option<String>) {
        self.cookie = id;
    }

    pub async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let builder = match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, format!("{}={}", self.cookie_name, cookie)),
            None => builder,
        };
        let res = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();

        let prefix = format!("{}=", self.cookie_name);
        for value in res.headers().get_all(header::SET_COOKIE) {
            let value = value.to_str().unwrap();
            if let Some(rest) = value.strip_prefix(&prefix) {
                // An empty value is the server clearing the cookie
                let id = rest.split(';').next().unwrap().to_string();
                self.cookie = if id.is_empty() { None } else { Some(id) };
            }
        }

        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes().to_vec();
        TestResponse { status, headers, body }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri), Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(builder, Body::from(form_encode(fields))).await
    }

    pub async fn post_multipart(&mut self, uri: &str, form: MultipartBody) -> TestResponse {
        let (content_type, body) = form.finish();
        let builder = Request::builder().method("POST").uri(uri).header(header::CONTENT_TYPE, content_type);
        self.send(builder, Body::from(body)).await
    }

    /// Follows a redirect and returns the page it lands on.
    pub async fn follow(&mut self, res: &TestResponse) -> TestResponse {
        let to = res.location().expect("not a redirect").to_string();
        self.get(&to).await
    }

    pub async fn register(&mut self, id: &str, ps: &str, name: &str, school: &str, mail: &str) -> TestResponse {
        self.post_form(
            "/auth/register",
            &[("user_id", id), ("user_ps", ps), ("user_name", name), ("user_school", school), ("user_mail", mail)],
        )
        .await
    }

    pub async fn login(&mut self, id: &str, ps: &str) -> TestResponse {
        self.post_form("/auth/login", &[("user_id", id), ("user_ps", ps)]).await
    }

    /// Creates a topic and returns its id.
    pub async fn create_topic(&mut self, form: MultipartBody) -> i64 {
        let res = self.post_multipart("/topic/create", form).await;
        let location = res.location().expect("create did not redirect").to_string();
        location
            .strip_prefix("/topic/read/")
            .and_then(|id| id.parse().ok())
            .unwrap_or_else(|| panic!("create redirected to {}", location))
    }
}

/// Hand-built `multipart/form-data` payload.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self { boundary: format!("----chocoboard{}", uuid::Uuid::new_v4().simple()), body: Vec::new() }
    }

    /// A topic form with title and body filled in.
    pub fn topic(title: &str, body: &str) -> Self {
        Self::new().text("title", title).text("body", body)
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", self.boundary, name, value)
                .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (format!("multipart/form-data; boundary={}", self.boundary), self.body)
    }
}

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
