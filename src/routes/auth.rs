//! Account creation, login/logout, account lookup and password reset.

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};

use crate::{
    error::{AppError, AppResult},
    mail::MailMessage,
    middleware::{ip::ClientIp, validation::sanitize_for_logging},
    password::{contains_whitespace, generate_code, generate_temporary_password},
    session::{redirect_with_flash, CurrentUser, PendingReset, Session, SessionUser},
    state::AppState,
    templates::{
        render, ChangePasswordTemplate, FindAccountTemplate, Layout, LoginTemplate, RegisterTemplate,
        ResetPasswordTemplate, VerifyTemplate,
    },
    types::{
        is_valid_mail, non_blank, ChangePasswordForm, FindAccountForm, LoginForm, RegisterForm, ResetPasswordForm, User,
        VerifyForm,
    },
};

pub async fn register_page(session: Session) -> AppResult<Html<String>> {
    render(&RegisterTemplate { layout: Layout::load(&session).await })
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    state.rate_limiter.check_endpoint_limit("/auth/register", ip).await?;

    if contains_whitespace(&form.user_id) || contains_whitespace(&form.user_ps) {
        return Err(AppError::redirect("/auth/register", "IDs and passwords must not contain spaces."));
    }
    if form.user_id.is_empty() || form.user_ps.is_empty() || form.user_name.trim().is_empty() {
        return Err(AppError::redirect("/auth/register", "ID, password and name are required."));
    }

    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE user_id = ?")
        .bind(&form.user_id)
        .fetch_optional(&state.db)
        .await?;
    if taken.is_some() {
        return Err(AppError::redirect("/auth/register", "This ID already exists."));
    }

    let mail = non_blank(&form.user_mail);
    if let Some(mail) = &mail {
        if !is_valid_mail(mail) {
            return Err(AppError::redirect("/auth/register", "Please enter a valid mail address."));
        }
        let used: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE user_mail = ?")
            .bind(mail)
            .fetch_optional(&state.db)
            .await?;
        if used.is_some() {
            return Err(AppError::redirect("/auth/register", "This mail address is already registered."));
        }
    }

    let hash = state.passwords.hash(&form.user_ps).await?;
    let inserted = sqlx::query(
        "INSERT INTO users (user_id, password_hash, user_name, user_school, user_mail) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&form.user_id)
    .bind(&hash)
    .bind(form.user_name.trim())
    .bind(non_blank(&form.user_school))
    .bind(&mail)
    .execute(&state.db)
    .await;

    match inserted.map_err(AppError::from) {
        Ok(_) => {}
        // Lost the race against a concurrent registration
        Err(AppError::Conflict(_)) => {
            return Err(AppError::redirect("/auth/register", "This ID or mail address already exists."));
        }
        Err(e) => return Err(e),
    }

    state.metrics.inc_users_registered();
    tracing::info!(user_id = %sanitize_for_logging(&form.user_id), "account registered");
    Ok(redirect_with_flash("/", "Registration complete. Please sign in."))
}

pub async fn login_page(session: Session) -> AppResult<Html<String>> {
    render(&LoginTemplate { layout: Layout::load(&session).await })
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: Session,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    state.rate_limiter.check_endpoint_limit("/auth/login", ip).await?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(&form.user_id)
        .fetch_optional(&state.db)
        .await?;
    let Some(user) = user else {
        state.metrics.inc_logins(false);
        return Err(AppError::redirect("/auth/login", "No such user."));
    };

    if !state.passwords.verify(&form.user_ps, &user.password_hash).await? {
        state.metrics.inc_logins(false);
        tracing::warn!(user_id = %sanitize_for_logging(&user.user_id), %ip, "login failed");
        return Err(AppError::redirect("/auth/login", "ID or password is incorrect."));
    }

    session.login(SessionUser { user_id: user.user_id.clone(), user_name: user.user_name.clone() }).await;
    state.metrics.inc_logins(true);
    tracing::info!(user_id = %sanitize_for_logging(&user.user_id), "login succeeded");
    Ok(redirect_with_flash("/", "Signed in."))
}

pub async fn logout(session: Session) -> Response {
    if session.logout().await {
        redirect_with_flash("/", "Signed out.")
    } else {
        Redirect::to("/").into_response()
    }
}

pub async fn find_account_page(session: Session) -> AppResult<Html<String>> {
    render(&FindAccountTemplate { layout: Layout::load(&session).await, found: None })
}

pub async fn find_account(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<FindAccountForm>,
) -> AppResult<Html<String>> {
    // `IS` so an account registered without a school matches an empty field
    let found: Option<String> =
        sqlx::query_scalar("SELECT user_id FROM users WHERE user_name = ? AND user_school IS ? ORDER BY id LIMIT 1")
            .bind(form.user_name.trim())
            .bind(non_blank(&form.user_school))
            .fetch_optional(&state.db)
            .await?;

    match found {
        Some(user_id) => render(&FindAccountTemplate { layout: Layout::load(&session).await, found: Some(user_id) }),
        None => Err(AppError::redirect("/auth/find_account", "No account matches that name and school.")),
    }
}

pub async fn reset_password_page(session: Session) -> AppResult<Html<String>> {
    render(&ResetPasswordTemplate { layout: Layout::load(&session).await })
}

pub async fn reset_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: Session,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Response> {
    state.rate_limiter.check_endpoint_limit("/auth/reset_password", ip).await?;

    let user: Option<(String, String)> = sqlx::query_as(
        "SELECT user_id, user_mail FROM users WHERE user_id = ? AND user_name = ? AND user_mail = ?",
    )
    .bind(&form.id)
    .bind(form.name.trim())
    .bind(form.mail.trim())
    .fetch_optional(&state.db)
    .await?;
    let Some((user_id, mail)) = user else {
        return Err(AppError::redirect("/auth/reset_password", "No such user."));
    };

    let code = generate_code();
    session
        .begin_reset(PendingReset {
            user_id: user_id.clone(),
            mail: mail.clone(),
            code: code.clone(),
            issued_at: Instant::now(),
            failed_attempts: 0,
        })
        .await;

    let message = MailMessage {
        to: mail,
        subject: format!("{} verification code", state.config.mail.sender_name),
        body: format!("Your verification code is [{}].", code),
    };
    if let Err(e) = state.mailer.send(&message).await {
        tracing::error!(user_id = %sanitize_for_logging(&user_id), "failed to send reset code: {:#}", e);
        session.clear_reset().await;
        return Err(AppError::redirect("/auth/reset_password", "The code could not be sent. Please try again."));
    }

    state.metrics.inc_resets_requested();
    tracing::info!(user_id = %sanitize_for_logging(&user_id), "password reset code sent");
    Ok(redirect_with_flash("/auth/verify", "A verification code was sent to your mail."))
}

/// The session's pending reset if it is still within its time to live.
/// An expired one is discarded.
async fn live_reset(state: &AppState, session: &Session) -> AppResult<PendingReset> {
    let Some(pending) = session.pending_reset().await else {
        return Err(AppError::redirect("/auth/reset_password", "Please request a verification code first."));
    };
    let ttl = Duration::from_secs(state.config.auth.reset_code_ttl_secs);
    if pending.issued_at.elapsed() >= ttl {
        session.clear_reset().await;
        return Err(AppError::redirect("/auth/reset_password", "The code has expired. Please request a new one."));
    }
    Ok(pending)
}

pub async fn verify_page(State(state): State<AppState>, session: Session) -> AppResult<Html<String>> {
    let pending = live_reset(&state, &session).await?;
    render(&VerifyTemplate { layout: Layout::load(&session).await, mail: pending.mail })
}

pub async fn verify(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    session: Session,
    Form(form): Form<VerifyForm>,
) -> AppResult<Response> {
    state.rate_limiter.check_endpoint_limit("/auth/verify", ip).await?;
    let pending = live_reset(&state, &session).await?;

    if form.code.trim() != pending.code {
        let failures = session.record_failed_reset_attempt().await;
        tracing::warn!(user_id = %sanitize_for_logging(&pending.user_id), failures, "wrong verification code");
        if failures >= state.config.auth.reset_max_attempts {
            session.clear_reset().await;
            return Err(AppError::redirect("/auth/reset_password", "Too many wrong codes. Please request a new one."));
        }
        session.flash("The verification code is incorrect.").await;
        let page = VerifyTemplate { layout: Layout::load(&session).await, mail: pending.mail };
        return render(&page).map(IntoResponse::into_response);
    }

    let temporary = generate_temporary_password();
    let hash = state.passwords.hash(&temporary).await?;
    let updated = sqlx::query("UPDATE users SET password_hash = ? WHERE user_id = ?")
        .bind(&hash)
        .bind(&pending.user_id)
        .execute(&state.db)
        .await?
        .rows_affected();
    session.clear_reset().await;
    if updated == 0 {
        tracing::warn!(user_id = %sanitize_for_logging(&pending.user_id), "account vanished during password reset");
        return Err(AppError::redirect("/auth/reset_password", "No such user."));
    }

    state.metrics.inc_resets_completed();
    tracing::info!(user_id = %sanitize_for_logging(&pending.user_id), "password reset completed");
    Ok(redirect_with_flash(
        "/auth/login",
        format!("Your password was reset. Your temporary password is {}", temporary),
    ))
}

pub async fn change_password_page(current: CurrentUser) -> AppResult<Html<String>> {
    render(&ChangePasswordTemplate { layout: Layout::load(&current.session).await })
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> AppResult<Response> {
    const BACK: &str = "/auth/change_password";

    if form.new_ps != form.re_new_ps {
        return Err(AppError::redirect(BACK, "The new passwords do not match."));
    }
    if form.new_ps.is_empty() {
        return Err(AppError::redirect(BACK, "The new password must not be empty."));
    }
    if contains_whitespace(&form.new_ps) {
        return Err(AppError::redirect(BACK, "Passwords must not contain spaces."));
    }

    let stored: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE user_id = ?")
        .bind(&current.user.user_id)
        .fetch_optional(&state.db)
        .await?;
    let verified = match stored {
        Some(hash) => state.passwords.verify(&form.old_ps, &hash).await?,
        None => false,
    };
    if !verified {
        return Err(AppError::redirect(BACK, "The current password is incorrect."));
    }

    let hash = state.passwords.hash(&form.new_ps).await?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE user_id = ?")
        .bind(&hash)
        .bind(&current.user.user_id)
        .execute(&state.db)
        .await?;

    current.session.logout().await;
    tracing::info!(user_id = %sanitize_for_logging(&current.user.user_id), "password changed");
    Ok(redirect_with_flash("/auth/login", "Your password was changed. Please sign in again."))
}
