//! Server-side sessions, flash messages and the login extractors.
//!
//! The browser only holds an opaque session id in an HttpOnly cookie. The data
//! (logged-in user, pending flash messages, password reset state, unlocked
//! secret topics) lives in [`SessionStore`]. [`session_middleware`] resolves the
//! cookie for every request, hands a [`Session`] to the handlers through the
//! request extensions and queues any [`FlashMessage`] the response carries.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// One-shot notice attached to a response; moved into the session by the middleware.
#[derive(Debug, Clone)]
pub struct FlashMessage(pub String);

/// Redirects to `to` and shows `message` on the next rendered page.
pub fn redirect_with_flash(to: &str, message: impl Into<String>) -> Response {
    let mut res = Redirect::to(to).into_response();
    res.extensions_mut().insert(FlashMessage(message.into()));
    res
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub user_name: String,
}

/// A password reset waiting for its emailed code.
#[derive(Debug, Clone)]
pub struct PendingReset {
    pub user_id: String,
    pub mail: String,
    pub code: String,
    pub issued_at: Instant,
    pub failed_attempts: u32,
}

#[derive(Debug)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub flashes: Vec<String>,
    pub pending_reset: Option<PendingReset>,
    pub unlocked_topics: HashSet<i64>,
    pub last_seen: Instant,
}

impl SessionData {
    fn new() -> Self {
        Self {
            user: None,
            flashes: Vec::new(),
            pending_reset: None,
            unlocked_topics: HashSet::new(),
            last_seen: Instant::now(),
        }
    }

    /// Nothing worth keeping a store entry for.
    fn is_empty(&self) -> bool {
        self.user.is_none() && self.flashes.is_empty() && self.pending_reset.is_none() && self.unlocked_topics.is_empty()
    }
}

fn new_session_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), idle_timeout }
    }

    /// Returns `Some(id)` when `id` names a live session (and refreshes it),
    /// otherwise `None`.
    pub async fn resume(&self, id: &str) -> Option<String> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(data) if now.saturating_duration_since(data.last_seen) < self.idle_timeout => {
                data.last_seen = now;
                Some(id.to_string())
            }
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn create(&self) -> String {
        let id = new_session_id();
        self.sessions.write().await.insert(id.clone(), SessionData::new());
        id
    }

    /// Replaces `old` with a fresh id. Only queued flashes move over.
    pub async fn rotate(&self, old: Option<&str>) -> String {
        let id = new_session_id();
        let mut data = SessionData::new();
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = old.and_then(|old| sessions.remove(old)) {
            data.flashes = previous.flashes;
        }
        sessions.insert(id.clone(), data);
        id
    }

    async fn get<R>(&self, id: &str, f: impl FnOnce(&SessionData) -> R) -> Option<R> {
        self.sessions.read().await.get(id).map(f)
    }

    async fn update<R>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> R) -> Option<R> {
        self.sessions.write().await.get_mut(id).map(f)
    }

    /// Runs `f` against the session; a vanished session is recreated empty.
    async fn with<R>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut sessions = self.sessions.write().await;
        let data = sessions.entry(id.to_string()).or_insert_with(SessionData::new);
        f(data)
    }

    /// Takes the queued flashes; a session left with nothing else is dropped.
    async fn take_flashes(&self, id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let Some(data) = sessions.get_mut(id) else {
            return Vec::new();
        };
        let flashes = std::mem::take(&mut data.flashes);
        if data.is_empty() {
            sessions.remove(id);
        }
        flashes
    }

    /// Removes sessions idle for longer than the timeout.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, data| now.saturating_duration_since(data.last_seen) < self.idle_timeout);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Handle to the current request's session.
///
/// The store entry is created on the first write, so read-only visits leave
/// nothing behind. Login and logout move the data to a new id.
#[derive(Clone)]
pub struct Session {
    store: SessionStore,
    id: Arc<Mutex<Option<String>>>,
}

impl Session {
    pub fn new(store: SessionStore, id: Option<String>) -> Self {
        Self { store, id: Arc::new(Mutex::new(id)) }
    }

    /// The id the browser should hold after this request, if any.
    pub async fn id(&self) -> Option<String> {
        self.id.lock().await.clone()
    }

    async fn get<R>(&self, f: impl FnOnce(&SessionData) -> R) -> Option<R> {
        let id = self.id().await?;
        self.store.get(&id, f).await
    }

    async fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> Option<R> {
        let id = self.id().await?;
        self.store.update(&id, f).await
    }

    /// Like `update`, but starts a session when there is none yet.
    async fn write<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut slot = self.id.lock().await;
        let id = match slot.as_ref() {
            Some(id) => id.clone(),
            None => {
                let id = self.store.create().await;
                *slot = Some(id.clone());
                id
            }
        };
        self.store.with(&id, f).await
    }

    pub async fn user(&self) -> Option<SessionUser> {
        self.get(|d| d.user.clone()).await.flatten()
    }

    /// Starts a fresh authenticated session for `user` under a new id.
    pub async fn login(&self, user: SessionUser) {
        let mut slot = self.id.lock().await;
        let id = self.store.rotate(slot.as_deref()).await;
        self.store.with(&id, |d| d.user = Some(user)).await;
        *slot = Some(id);
    }

    /// Returns whether someone was logged in.
    pub async fn logout(&self) -> bool {
        let mut slot = self.id.lock().await;
        let Some(current) = slot.clone() else {
            return false;
        };
        let was_logged_in = self.store.get(&current, |d| d.user.is_some()).await.unwrap_or(false);
        if was_logged_in {
            *slot = Some(self.store.rotate(Some(&current)).await);
        }
        was_logged_in
    }

    pub async fn rename_user(&self, user_name: &str) {
        self.update(|d| {
            if let Some(user) = d.user.as_mut() {
                user.user_name = user_name.to_string();
            }
        })
        .await;
    }

    pub async fn flash(&self, message: impl Into<String>) {
        let message = message.into();
        self.write(|d| d.flashes.push(message)).await
    }

    pub async fn take_flashes(&self) -> Vec<String> {
        match self.id().await {
            Some(id) => self.store.take_flashes(&id).await,
            None => Vec::new(),
        }
    }

    pub async fn unlock_topic(&self, topic_id: i64) {
        self.write(|d| {
            d.unlocked_topics.insert(topic_id);
        })
        .await
    }

    pub async fn is_unlocked(&self, topic_id: i64) -> bool {
        self.get(|d| d.unlocked_topics.contains(&topic_id)).await.unwrap_or(false)
    }

    pub async fn begin_reset(&self, reset: PendingReset) {
        self.write(|d| d.pending_reset = Some(reset)).await
    }

    pub async fn pending_reset(&self) -> Option<PendingReset> {
        self.get(|d| d.pending_reset.clone()).await.flatten()
    }

    /// Counts a wrong code and returns the new failure count.
    pub async fn record_failed_reset_attempt(&self) -> u32 {
        self.update(|d| match d.pending_reset.as_mut() {
            Some(reset) => {
                reset.failed_attempts += 1;
                reset.failed_attempts
            }
            None => 0,
        })
        .await
        .unwrap_or(0)
    }

    pub async fn clear_reset(&self) {
        self.update(|d| d.pending_reset = None).await;
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session layer is not installed")))
    }
}

/// The logged-in user. Anonymous requests are sent to the login page.
#[derive(Clone)]
pub struct CurrentUser {
    pub user: SessionUser,
    pub session: Session,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        match session.user().await {
            Some(user) => Ok(CurrentUser { user, session }),
            None => Err(AppError::redirect("/auth/login", "Please sign in first.")),
        }
    }
}

/// Resolves the session cookie for every request, persists flashes carried
/// by the response and sets the cookie whenever the session id changed.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let cfg = &state.config.session;
    let presented = jar.get(&cfg.cookie_name).map(|cookie| cookie.value().to_string());
    let resumed = match &presented {
        Some(id) => state.sessions.resume(id).await,
        None => None,
    };

    let session = Session::new(state.sessions.clone(), resumed.clone());
    req.extensions_mut().insert(session.clone());

    let mut res = next.run(req).await;
    if let Some(FlashMessage(message)) = res.extensions_mut().remove::<FlashMessage>() {
        session.flash(message).await;
    }

    let cookie = |value: String| {
        Cookie::build((cfg.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(cfg.secure_cookie)
            .build()
    };
    match session.id().await {
        Some(id) if resumed.as_deref() != Some(id.as_str()) => (jar.add(cookie(id)), res).into_response(),
        // Stale cookie and nothing new to store
        None if presented.is_some() => (jar.remove(cookie(String::new())), res).into_response(),
        _ => res,
    }
}
