//! Profiles, profile images and account deletion.

use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Form,
};

use super::{path_segment, topic::content_type_for};
use crate::{
    error::{AppError, AppResult, OptionExt},
    middleware::validation::sanitize_for_logging,
    session::{redirect_with_flash, CurrentUser},
    state::AppState,
    templates::{render, DeleteAccountTemplate, Layout, ProfileEditTemplate, ProfileTemplate},
    types::{non_blank, DeleteAccountForm, User},
    uploads::{profile_file_name, read_multipart, PROFILE_IMAGES},
};

async fn load_user(state: &AppState, user_id: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE user_id = ?").bind(user_id).fetch_optional(&state.db).await?)
}

/// The logged-in account. A session whose account vanished is signed out.
async fn own_account(state: &AppState, current: &CurrentUser) -> AppResult<User> {
    match load_user(state, &current.user.user_id).await? {
        Some(user) => Ok(user),
        None => {
            current.session.logout().await;
            Err(AppError::redirect("/auth/login", "Please sign in first."))
        }
    }
}

/// `GET /user/profile/{user_id}`
pub async fn profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Html<String>> {
    let user = load_user(&state, &user_id).await?.or_redirect("/", "No such user.")?;
    let is_self = user.user_id == current.user.user_id;
    render(&ProfileTemplate { layout: Layout::load(&current.session).await, user, is_self })
}

/// `GET /user/avatar/{user_id}`
pub async fn avatar(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Response> {
    let image: Option<Option<String>> = sqlx::query_scalar("SELECT profile_image FROM users WHERE user_id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await?;
    let Some(stored) = image.flatten() else {
        return Err(AppError::NotFound("No profile image.".to_string()));
    };

    let bytes = match state.uploads.read(&state.uploads.path_for(&stored)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(image = %stored, "profile image missing on disk");
            return Err(AppError::NotFound("No profile image.".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(([(header::CONTENT_TYPE, content_type_for(&stored))], bytes).into_response())
}

/// `GET /user/profile/edit`
pub async fn profile_edit_page(State(state): State<AppState>, current: CurrentUser) -> AppResult<Html<String>> {
    let user = own_account(&state, &current).await?;
    render(&ProfileEditTemplate {
        layout: Layout::load(&current.session).await,
        user_name: user.user_name,
        user_school: user.user_school.unwrap_or_default(),
        has_image: user.profile_image.is_some(),
        user_id: user.user_id,
    })
}

/// `POST /user/profile/edit` (multipart: user_name, user_school, profile_image)
pub async fn profile_edit(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    const BACK: &str = "/user/profile/edit";

    let user = own_account(&state, &current).await?;
    let mut form = read_multipart(multipart, state.uploads.max_file_size())
        .await
        .map_err(|e| AppError::redirect(BACK, e.to_string()))?;

    let user_name = form.text("user_name").trim().to_string();
    if user_name.is_empty() {
        return Err(AppError::redirect(BACK, "Name is required."));
    }
    let user_school = non_blank(form.text("user_school"));

    let image = form.take_file("profile_image");
    if let Some(file) = &image {
        file.validate(&PROFILE_IMAGES).map_err(|e| AppError::redirect(BACK, e.to_string()))?;
    }

    let old_image = user.profile_image.clone();
    let new_image: Option<String> = image.as_ref().map(|file| profile_file_name(user.id, &file.safe_name()));
    let staged = match (&image, &new_image) {
        (Some(file), Some(stored)) => Some(state.uploads.stage(stored, &file.bytes).await?),
        _ => None,
    };

    let result = async {
        let mut tx = state.db.begin().await?;
        sqlx::query("UPDATE users SET user_name = ?, user_school = ?, profile_image = COALESCE(?, profile_image) WHERE user_id = ?")
            .bind(&user_name)
            .bind(&user_school)
            .bind(&new_image)
            .bind(&user.user_id)
            .execute(&mut *tx)
            .await?;
        // Listings show the author name stored on each topic
        sqlx::query("UPDATE topic SET post_user_name = ? WHERE post_user_id = ?")
            .bind(&user_name)
            .bind(&user.user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(e) = result {
        if let Some(staged) = staged {
            staged.discard().await;
        }
        return Err(e);
    }

    if let Some(staged) = staged {
        staged.persist().await?;
    }
    if let (Some(new), Some(old)) = (&new_image, &old_image) {
        if new != old {
            state.uploads.remove(&state.uploads.path_for(old)).await;
        }
    }
    if let Some(file) = &image {
        state.metrics.add_upload(file.bytes.len() as u64);
    }

    current.session.rename_user(&user_name).await;
    tracing::info!(user_id = %sanitize_for_logging(&user.user_id), new_image = new_image.is_some(), "profile updated");
    Ok(redirect_with_flash(&format!("/user/profile/{}", path_segment(&user.user_id)), "Your profile was updated."))
}

/// `GET /user/delete_account`
pub async fn delete_account_page(current: CurrentUser) -> AppResult<Html<String>> {
    render(&DeleteAccountTemplate { layout: Layout::load(&current.session).await })
}

/// `POST /user/delete_account`: removes the account, its topics and every
/// file they own.
pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<DeleteAccountForm>,
) -> AppResult<Response> {
    let user = own_account(&state, &current).await?;
    if !state.passwords.verify(&form.password, &user.password_hash).await? {
        return Err(AppError::redirect("/user/delete_account", "The password is incorrect."));
    }

    let attachments: Vec<String> = sqlx::query_scalar(
        "SELECT f.file_path FROM files f JOIN topic t ON f.topic_id = t.id WHERE t.post_user_id = ?",
    )
    .bind(&user.user_id)
    .fetch_all(&state.db)
    .await?;

    let mut tx = state.db.begin().await?;
    let topics = sqlx::query("DELETE FROM topic WHERE post_user_id = ?")
        .bind(&user.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM users WHERE user_id = ?").bind(&user.user_id).execute(&mut *tx).await?;
    tx.commit().await?;

    // Rows are gone; stray files are only a disk leak
    let mut paths: Vec<PathBuf> = attachments.into_iter().map(PathBuf::from).collect();
    if let Some(image) = &user.profile_image {
        paths.push(state.uploads.path_for(image));
    }
    for path in &paths {
        state.uploads.remove(path).await;
    }

    current.session.logout().await;
    state.metrics.inc_accounts_deleted();
    tracing::info!(user_id = %sanitize_for_logging(&user.user_id), topics, files = paths.len(), "account deleted");
    Ok(redirect_with_flash("/", "Your account was deleted."))
}
