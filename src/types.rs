use serde::Deserialize;

// Rows
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub password_hash: String,
    pub user_name: String,
    pub user_school: Option<String>,
    pub user_mail: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub post_user_id: String,
    pub post_user_name: String,
    pub is_secret: bool,
    pub secret_key: Option<String>,
    pub created_at: String,
}

impl Topic {
    /// Whether `viewer` may see the body. Public topics are readable by anyone,
    /// secret ones only by the author or after the key was supplied.
    pub fn readable_by(&self, viewer: &str, unlocked: bool) -> bool {
        !self.is_secret || self.post_user_id == viewer || unlocked
    }

    pub fn is_owned_by(&self, viewer: &str) -> bool {
        self.post_user_id == viewer
    }
}

/// Listing row; never carries the body or the secret key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicSummary {
    pub id: i64,
    pub title: String,
    pub post_user_id: String,
    pub post_user_name: String,
    pub is_secret: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Attachment {
    pub id: i64,
    pub topic_id: i64,
    pub file_name: String,
    pub file_path: String,
}

// Query strings
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

impl PageQuery {
    /// Requested page; anything that is not an integer means page 1.
    pub fn requested(&self) -> i64 {
        self.page.as_deref().and_then(|p| p.trim().parse().ok()).unwrap_or(1)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search_name: Option<String>,
    #[serde(default)]
    pub search_menu: Option<String>,
}

// Forms
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub user_id: String,
    pub user_ps: String,
    pub user_name: String,
    #[serde(default)]
    pub user_school: String,
    #[serde(default)]
    pub user_mail: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub user_id: String,
    pub user_ps: String,
}

#[derive(Debug, Deserialize)]
pub struct FindAccountForm {
    pub user_name: String,
    #[serde(default)]
    pub user_school: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub id: String,
    pub name: String,
    pub mail: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyForm {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub old_ps: String,
    #[serde(default)]
    pub new_ps: String,
    #[serde(default)]
    pub re_new_ps: String,
}

#[derive(Debug, Deserialize)]
pub struct SecretKeyForm {
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    #[serde(default)]
    pub password: String,
}

/// Empty or whitespace-only optional form fields are stored as NULL.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One `@` with text on both sides and no whitespace or control characters,
/// so the address can go into a mail header unchanged.
pub fn is_valid_mail(value: &str) -> bool {
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
