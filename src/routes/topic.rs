//! Topics: reading (with secret unlock), writing, attachments and search.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    error::{AppError, AppResult, OptionExt},
    middleware::validation::sanitize_for_logging,
    session::{redirect_with_flash, CurrentUser, Session},
    state::AppState,
    templates::{render, CreateTemplate, Layout, ReadSecretTemplate, ReadTemplate, SearchTemplate, UpdateTemplate},
    types::{Attachment, SearchQuery, SecretKeyForm, Topic, TopicSummary},
    uploads::{extension, read_multipart, topic_file_name, StagedUpload, UploadedFile, TOPIC_ATTACHMENTS},
};

const NO_SUCH_TOPIC: &str = "This topic does not exist.";

async fn load_topic(db: &SqlitePool, id: i64) -> AppResult<Option<Topic>> {
    Ok(sqlx::query_as("SELECT * FROM topic WHERE id = ?").bind(id).fetch_optional(db).await?)
}

async fn load_attachment(db: &SqlitePool, topic_id: i64) -> AppResult<Option<Attachment>> {
    Ok(sqlx::query_as("SELECT id, topic_id, file_name, file_path FROM files WHERE topic_id = ?")
        .bind(topic_id)
        .fetch_optional(db)
        .await?)
}

/// Loads the topic and checks that `current` wrote it.
async fn owned_topic(state: &AppState, current: &CurrentUser, id: i64, action: &str) -> AppResult<Topic> {
    let topic = load_topic(&state.db, id).await?.or_redirect("/", NO_SUCH_TOPIC)?;
    if !topic.is_owned_by(&current.user.user_id) {
        tracing::warn!(
            topic_id = id,
            user_id = %sanitize_for_logging(&current.user.user_id),
            "refused to {} someone else's topic", action
        );
        return Err(AppError::redirect("/", format!("You may only {} your own topics.", action)));
    }
    Ok(topic)
}

async fn render_topic(state: &AppState, current: &CurrentUser, topic: Topic) -> AppResult<Response> {
    let unlocked = current.session.is_unlocked(topic.id).await;
    let layout = Layout::load(&current.session).await;
    if !topic.readable_by(&current.user.user_id, unlocked) {
        return render(&ReadSecretTemplate { layout, topic_id: topic.id, title: topic.title })
            .map(IntoResponse::into_response);
    }
    let attachment = load_attachment(&state.db, topic.id).await?;
    let is_owner = topic.is_owned_by(&current.user.user_id);
    render(&ReadTemplate { layout, topic, attachment, is_owner }).map(IntoResponse::into_response)
}

/// `GET /topic/read/{id}`
pub async fn read(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> AppResult<Response> {
    let topic = load_topic(&state.db, id).await?.or_redirect("/", NO_SUCH_TOPIC)?;
    render_topic(&state, &current, topic).await
}

/// `POST /topic/read/{id}`: submits the secret key of a secret topic.
pub async fn unlock(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<SecretKeyForm>,
) -> AppResult<Response> {
    let topic = load_topic(&state.db, id).await?.or_redirect("/", NO_SUCH_TOPIC)?;
    if topic.is_secret {
        let matches = match &topic.secret_key {
            Some(hash) => state.passwords.verify(&form.secret_key, hash).await?,
            None => false,
        };
        if !matches {
            tracing::info!(topic_id = id, user_id = %sanitize_for_logging(&current.user.user_id), "wrong secret key");
            return Err(AppError::redirect("/", "The secret key is wrong."));
        }
        current.session.unlock_topic(id).await;
    }
    render_topic(&state, &current, topic).await
}

pub async fn create_page(current: CurrentUser) -> AppResult<Html<String>> {
    render(&CreateTemplate { layout: Layout::load(&current.session).await })
}

/// Trimmed, required title and body.
fn title_and_body(title: &str, body: &str, back: &str) -> AppResult<(String, String)> {
    let (title, body) = (title.trim(), body.trim());
    if title.is_empty() || body.is_empty() {
        return Err(AppError::redirect(back, "Title and body are required."));
    }
    Ok((title.to_string(), body.to_string()))
}

/// Validates an optional upload; errors send the user back to `back`.
fn checked_upload(file: Option<UploadedFile>, back: &str) -> AppResult<Option<UploadedFile>> {
    match file {
        Some(file) => {
            file.validate(&TOPIC_ATTACHMENTS).map_err(|e| AppError::redirect(back, e.to_string()))?;
            Ok(Some(file))
        }
        None => Ok(None),
    }
}

async fn insert_attachment(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: i64,
    file_name: &str,
    path: &FsPath,
) -> AppResult<()> {
    sqlx::query("INSERT INTO files (topic_id, file_name, file_path) VALUES (?, ?, ?)")
        .bind(topic_id)
        .bind(file_name)
        .bind(path.to_string_lossy().as_ref())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// `POST /topic/create` (multipart: title, body, is_secret, secret_key, file)
pub async fn create(State(state): State<AppState>, current: CurrentUser, multipart: Multipart) -> AppResult<Response> {
    const BACK: &str = "/topic/create";

    let mut form = read_multipart(multipart, state.uploads.max_file_size())
        .await
        .map_err(|e| AppError::redirect(BACK, e.to_string()))?;
    let (title, body) = title_and_body(form.text("title"), form.text("body"), BACK)?;
    let is_secret = form.has("is_secret");
    let secret_key = form.text("secret_key").to_string();
    if is_secret && secret_key.is_empty() {
        return Err(AppError::redirect(BACK, "Secret topics need a secret key."));
    }
    let upload = checked_upload(form.take_file("file"), BACK)?;

    let secret_hash = if is_secret { Some(state.passwords.hash(&secret_key).await?) } else { None };

    let mut tx = state.db.begin().await?;
    let topic_id = sqlx::query(
        "INSERT INTO topic (title, body, post_user_id, post_user_name, is_secret, secret_key) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&title)
    .bind(&body)
    .bind(&current.user.user_id)
    .bind(&current.user.user_name)
    .bind(is_secret)
    .bind(&secret_hash)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let mut staged: Option<StagedUpload> = None;
    if let Some(file) = &upload {
        let file_name = file.safe_name();
        let new = state.uploads.stage(&topic_file_name(topic_id, &file_name), &file.bytes).await?;
        let inserted = insert_attachment(&mut tx, topic_id, &file_name, new.path()).await;
        if let Err(e) = inserted {
            new.discard().await;
            return Err(e);
        }
        staged = Some(new);
    }

    if let Err(e) = tx.commit().await {
        if let Some(new) = staged {
            new.discard().await;
        }
        return Err(e.into());
    }
    if let Some(new) = staged {
        new.persist().await?;
    }

    state.metrics.inc_topics_created();
    if let Some(file) = &upload {
        state.metrics.add_upload(file.bytes.len() as u64);
    }
    tracing::info!(topic_id, user_id = %sanitize_for_logging(&current.user.user_id), is_secret, "topic created");
    Ok(Redirect::to(&format!("/topic/read/{}", topic_id)).into_response())
}

/// `GET /topic/update/{id}`
pub async fn update_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Html<String>> {
    let topic = owned_topic(&state, &current, id, "edit").await?;
    let attachment = load_attachment(&state.db, id).await?;
    render(&UpdateTemplate { layout: Layout::load(&current.session).await, topic, attachment })
}

/// `POST /topic/update/{id}` (multipart: title, body, optional replacement file)
pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    owned_topic(&state, &current, id, "edit").await?;
    let back = format!("/topic/update/{}", id);

    let mut form = read_multipart(multipart, state.uploads.max_file_size())
        .await
        .map_err(|e| AppError::redirect(&back, e.to_string()))?;
    let (title, body) = title_and_body(form.text("title"), form.text("body"), &back)?;
    let upload = checked_upload(form.take_file("file"), &back)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE topic SET title = ?, body = ? WHERE id = ?")
        .bind(&title)
        .bind(&body)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let mut replaced: Option<(StagedUpload, Option<PathBuf>)> = None;
    if let Some(file) = &upload {
        let old: Option<String> = sqlx::query_scalar("SELECT file_path FROM files WHERE topic_id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let file_name = file.safe_name();
        // The old file stays in place until the new row is committed
        let new = state.uploads.stage(&topic_file_name(id, &file_name), &file.bytes).await?;

        let result = async {
            sqlx::query("DELETE FROM files WHERE topic_id = ?").bind(id).execute(&mut *tx).await?;
            insert_attachment(&mut tx, id, &file_name, new.path()).await
        }
        .await;
        if let Err(e) = result {
            new.discard().await;
            return Err(e);
        }
        replaced = Some((new, old.map(PathBuf::from)));
    }

    if let Err(e) = tx.commit().await {
        if let Some((new, _)) = replaced {
            new.discard().await;
        }
        return Err(e.into());
    }

    if let Some((new, old)) = replaced {
        let path = new.persist().await?;
        if let Some(old) = old.filter(|old| *old != path) {
            state.uploads.remove(&old).await;
        }
    }

    state.metrics.inc_topics_updated();
    if let Some(file) = &upload {
        state.metrics.add_upload(file.bytes.len() as u64);
    }
    tracing::info!(topic_id = id, replaced_file = upload.is_some(), "topic updated");
    Ok(Redirect::to(&format!("/topic/read/{}", id)).into_response())
}

/// `POST /topic/delete/{id}`
pub async fn delete(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> AppResult<Response> {
    owned_topic(&state, &current, id, "delete").await?;
    let attachment = load_attachment(&state.db, id).await?;

    // The files row goes with the topic (ON DELETE CASCADE)
    sqlx::query("DELETE FROM topic WHERE id = ?").bind(id).execute(&state.db).await?;
    if let Some(file) = attachment {
        state.uploads.remove(FsPath::new(&file.file_path)).await;
    }

    state.metrics.inc_topics_deleted();
    tracing::info!(topic_id = id, user_id = %sanitize_for_logging(&current.user.user_id), "topic deleted");
    Ok(redirect_with_flash("/", "The topic was deleted."))
}

pub(crate) fn content_type_for(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("txt") => "text/plain; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// `GET /topic/download/{id}`: same access rule as reading the topic.
pub async fn download(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let topic = load_topic(&state.db, id).await?.or_redirect("/", NO_SUCH_TOPIC)?;
    let unlocked = current.session.is_unlocked(id).await;
    if !topic.readable_by(&current.user.user_id, unlocked) {
        return Err(AppError::redirect(format!("/topic/read/{}", id), "Enter the secret key first."));
    }
    let file = load_attachment(&state.db, id).await?.or_redirect("/", "The file could not be found.")?;

    let bytes = match state.uploads.read(FsPath::new(&file.file_path)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(topic_id = id, path = %file.file_path, "attachment missing on disk");
            return Err(AppError::redirect("/", "The file could not be found."));
        }
        Err(e) => return Err(e.into()),
    };

    // file_name is already restricted to [A-Za-z0-9_.-]
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&file.file_name).to_string()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response())
}

/// Escapes `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `GET /topic/search?search_name=..&search_menu=title|body|title_body`
pub async fn search(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<SearchQuery>,
) -> AppResult<Html<String>> {
    let term = q.search_name.as_deref().unwrap_or("").trim().to_string();
    let menu = q.search_menu.clone().unwrap_or_default();
    let layout = Layout::load(&session).await;

    if term.is_empty() {
        return render(&SearchTemplate {
            layout,
            topics: Vec::new(),
            search_name: String::new(),
            search_menu: menu,
            error: None,
            searched: false,
        });
    }

    let sql = match menu.as_str() {
        "title" => {
            r"SELECT id, title, post_user_id, post_user_name, is_secret, created_at FROM topic
              WHERE title LIKE ?1 ESCAPE '\'
              ORDER BY id DESC LIMIT ?3"
        }
        // Secret bodies only match for their author
        "body" => {
            r"SELECT id, title, post_user_id, post_user_name, is_secret, created_at FROM topic
              WHERE body LIKE ?1 ESCAPE '\' AND (is_secret = 0 OR post_user_id = ?2)
              ORDER BY id DESC LIMIT ?3"
        }
        "title_body" => {
            r"SELECT id, title, post_user_id, post_user_name, is_secret, created_at FROM topic
              WHERE title LIKE ?1 ESCAPE '\'
                 OR (body LIKE ?1 ESCAPE '\' AND (is_secret = 0 OR post_user_id = ?2))
              ORDER BY id DESC LIMIT ?3"
        }
        _ => {
            return render(&SearchTemplate {
                layout,
                topics: Vec::new(),
                search_name: term,
                search_menu: menu,
                error: Some("Unknown search type.".to_string()),
                searched: true,
            });
        }
    };

    let viewer = layout.viewer.as_ref().map(|u| u.user_id.clone()).unwrap_or_default();
    let topics: Vec<TopicSummary> = sqlx::query_as(sql)
        .bind(like_pattern(&term))
        .bind(&viewer)
        .bind(state.config.board.search_limit)
        .fetch_all(&state.db)
        .await?;

    render(&SearchTemplate { layout, topics, search_name: term, search_menu: menu, error: None, searched: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("choco"), "%choco%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.TXT"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
