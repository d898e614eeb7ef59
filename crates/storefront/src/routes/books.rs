//! Book catalog and bookmark API.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{instrument, warn};

use lamplight_core::{Book, BookId, catalog};

use crate::db::BookRepository;
use crate::error::{AppError, Result};
use crate::models::{Bookmark, session_keys};
use crate::services::SessionStorage;
use crate::state::AppState;

/// Longest chapter label stored in a bookmark.
const MAX_CHAPTER_CHARS: usize = 120;

fn find_book(id: BookId) -> Result<&'static Book> {
    catalog::find(id).ok_or_else(|| AppError::NotFound(format!("book {id}")))
}

/// All books, in display order.
pub async fn index() -> Json<&'static [Book]> {
    Json(catalog::books())
}

/// One book.
#[instrument]
pub async fn show(Path(id): Path<BookId>) -> Result<Json<&'static Book>> {
    find_book(id).map(Json)
}

/// Featured books.
///
/// Uses the ranking from `featured_books()` when the database has one and
/// falls back to the catalog's own featured flags otherwise.
#[instrument(skip(state))]
pub async fn featured(State(state): State<AppState>) -> Json<Vec<&'static Book>> {
    let ranked: Vec<&'static Book> = match BookRepository::new(state.pool()).featured_ids().await {
        Ok(ids) => ids.into_iter().filter_map(catalog::find).collect(),
        Err(e) => {
            warn!(error = %e, "Featured books unavailable, using catalog flags");
            Vec::new()
        }
    };

    if ranked.is_empty() {
        Json(catalog::featured().collect())
    } else {
        Json(ranked)
    }
}

/// Bookmark update body.
#[derive(Debug, Deserialize)]
pub struct BookmarkForm {
    pub page: u32,
    #[serde(default)]
    pub chapter: Option<String>,
}

/// The visitor's reading position in a book, or `null`.
#[instrument(skip(session))]
pub async fn bookmark(
    session: Session,
    Path(id): Path<BookId>,
) -> Result<Json<Option<Bookmark>>> {
    find_book(id)?;
    let bookmark = SessionStorage::load(&session, &session_keys::bookmark(id)).await?;
    Ok(Json(bookmark))
}

/// Save the visitor's reading position in a book.
#[instrument(skip(session, form))]
pub async fn save_bookmark(
    session: Session,
    Path(id): Path<BookId>,
    Json(form): Json<BookmarkForm>,
) -> Result<Json<Bookmark>> {
    find_book(id)?;

    let chapter = form
        .chapter
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty());
    if chapter
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_CHAPTER_CHARS)
    {
        return Err(AppError::BadRequest(format!(
            "chapter must be at most {MAX_CHAPTER_CHARS} characters"
        )));
    }

    let bookmark = Bookmark {
        page: form.page,
        chapter,
        updated_at: Utc::now(),
    };
    SessionStorage::store(&session, &session_keys::bookmark(id), &bookmark).await?;

    Ok(Json(bookmark))
}
