//! Server-rendered pages.
//!
//! Every page extends `base.html`, which needs a [`Layout`]: the flashes to
//! show once and the logged-in user for the navigation bar.

use askama::Template;
use axum::response::Html;

use crate::error::AppResult;
use crate::pagination::PageLink;
use crate::session::{Session, SessionUser};
use crate::types::{Attachment, Topic, TopicSummary, User};

pub struct Layout {
    pub flashes: Vec<String>,
    pub viewer: Option<SessionUser>,
}

impl Layout {
    /// Consumes the session's pending flashes.
    pub async fn load(session: &Session) -> Self {
        Self { flashes: session.take_flashes().await, viewer: session.user().await }
    }
}

pub fn render<T: Template>(page: &T) -> AppResult<Html<String>> {
    Ok(Html(page.render()?))
}

/// Standalone page; also used when the layout itself cannot be built.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub message: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub layout: Layout,
    pub topics: Vec<TopicSummary>,
    pub current_page: i64,
    pub last_page: i64,
    pub pages: Vec<PageLink>,
    pub prev: Option<i64>,
    pub next: Option<i64>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "find_account.html")]
pub struct FindAccountTemplate {
    pub layout: Layout,
    /// Login id of the matched account.
    pub found: Option<String>,
}

#[derive(Template)]
#[template(path = "reset_password.html")]
pub struct ResetPasswordTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "verify.html")]
pub struct VerifyTemplate {
    pub layout: Layout,
    pub mail: String,
}

#[derive(Template)]
#[template(path = "change_password.html")]
pub struct ChangePasswordTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "read.html")]
pub struct ReadTemplate {
    pub layout: Layout,
    pub topic: Topic,
    pub attachment: Option<Attachment>,
    pub is_owner: bool,
}

#[derive(Template)]
#[template(path = "read_secret.html")]
pub struct ReadSecretTemplate {
    pub layout: Layout,
    pub topic_id: i64,
    pub title: String,
}

#[derive(Template)]
#[template(path = "create.html")]
pub struct CreateTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "update.html")]
pub struct UpdateTemplate {
    pub layout: Layout,
    pub topic: Topic,
    pub attachment: Option<Attachment>,
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchTemplate {
    pub layout: Layout,
    pub topics: Vec<TopicSummary>,
    pub search_name: String,
    pub search_menu: String,
    pub error: Option<String>,
    /// False for the bare form (no term yet).
    pub searched: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub user: User,
    pub is_self: bool,
}

#[derive(Template)]
#[template(path = "profile_edit.html")]
pub struct ProfileEditTemplate {
    pub layout: Layout,
    pub user_name: String,
    pub user_school: String,
    pub has_image: bool,
    pub user_id: String,
}

#[derive(Template)]
#[template(path = "delete_account.html")]
pub struct DeleteAccountTemplate {
    pub layout: Layout,
}
