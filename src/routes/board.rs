use axum::{
    extract::{Query, State},
    response::Html,
};

use crate::{
    error::AppResult,
    pagination::{clamp_page, offset, page_links, total_pages},
    session::Session,
    state::AppState,
    templates::{render, IndexTemplate, Layout},
    types::{PageQuery, TopicSummary},
};

/// `GET /?page=N`: newest topics first, `board.page_size` per page.
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<PageQuery>,
) -> AppResult<Html<String>> {
    let per_page = state.config.board.page_size;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topic").fetch_one(&state.db).await?;
    let last_page = total_pages(total, per_page);
    let page = clamp_page(q.requested(), last_page);

    let topics: Vec<TopicSummary> = sqlx::query_as(
        "SELECT id, title, post_user_id, post_user_name, is_secret, created_at
         FROM topic ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset(page, per_page))
    .fetch_all(&state.db)
    .await?;

    render(&IndexTemplate {
        layout: Layout::load(&session).await,
        topics,
        current_page: page,
        last_page,
        pages: page_links(page, last_page),
        prev: (page > 1).then_some(page - 1),
        next: (page < last_page).then_some(page + 1),
    })
}
