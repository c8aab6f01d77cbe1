//! Song catalog endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::{ChordSheetResponse, PageResponse, SongResponse};
use crate::auth::CurrentUser;
use crate::data::{EntityId, Song};
use crate::error::AppError;

const DEFAULT_PAGE_SIZE: u32 = 30;
const MAX_PAGE_SIZE: u32 = 100;
const MAX_TITLE_CHARS: usize = 255;
const MAX_ARTIST_CHARS: usize = 255;

/// Create song request
#[derive(Debug, Deserialize)]
pub struct CreateSongRequest {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub chord_url: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Update song request
///
/// Absent fields keep their stored values.
#[derive(Debug, Deserialize)]
pub struct UpdateSongRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub chord_url: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Listing parameters
#[derive(Debug, Deserialize)]
pub struct SongListParams {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

fn validated_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required.".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters.",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

fn validated_artist(artist: &str) -> Result<String, AppError> {
    let artist = artist.trim();
    if artist.chars().count() > MAX_ARTIST_CHARS {
        return Err(AppError::Validation(format!(
            "Artist must be at most {} characters.",
            MAX_ARTIST_CHARS
        )));
    }
    Ok(artist.to_string())
}

/// Normalize an optional chord link; empty clears it
fn validated_chord_url(chord_url: Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = chord_url else {
        return Ok(None);
    };

    let raw = raw.trim().to_string();
    if raw.is_empty() {
        return Ok(None);
    }

    url::Url::parse(&raw)
        .map_err(|_| AppError::Validation("chord_url must be a valid URL.".to_string()))?;

    Ok(Some(raw))
}

fn validated_duration(duration_ms: Option<i64>) -> Result<Option<i64>, AppError> {
    if let Some(duration) = duration_ms {
        if duration < 0 {
            return Err(AppError::Validation(
                "duration_ms must not be negative.".to_string(),
            ));
        }
    }
    Ok(duration_ms)
}

/// POST /songs
/// Add a song to the owner's catalog
pub async fn create_song(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<CreateSongRequest>,
) -> Result<(StatusCode, Json<SongResponse>), AppError> {
    let song = Song {
        id: EntityId::new().to_string(),
        user_id: session.user_id,
        title: validated_title(&req.title)?,
        artist: validated_artist(&req.artist)?,
        chord_url: validated_chord_url(req.chord_url)?,
        duration_ms: validated_duration(req.duration_ms)?,
        catalog_track_id: None,
        created_at: chrono::Utc::now(),
    };

    state.db.insert_song(&song).await?;

    Ok((StatusCode::CREATED, Json(song.into())))
}

/// GET /songs
/// List the owner's songs, optionally filtered by a search term
pub async fn list_songs(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<SongListParams>,
) -> Result<Json<PageResponse<SongResponse>>, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let search = params.search.as_deref().map(str::trim);

    let offset = i64::from(page - 1) * i64::from(page_size);
    let songs = state
        .db
        .list_songs(&session.user_id, search, i64::from(page_size), offset)
        .await?;
    let total = state.db.count_songs(&session.user_id, search).await?;

    let items = songs.into_iter().map(SongResponse::from).collect();

    Ok(Json(PageResponse::new(items, page, page_size, total)))
}

/// GET /songs/:id
/// Get a specific song
pub async fn get_song(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SongResponse>, AppError> {
    let song = state
        .db
        .get_song(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(song.into()))
}

/// PUT /songs/:id
/// Update a song
pub async fn update_song(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateSongRequest>,
) -> Result<Json<SongResponse>, AppError> {
    let existing = state
        .db
        .get_song(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let title = match req.title {
        Some(title) => validated_title(&title)?,
        None => existing.title,
    };
    let artist = match req.artist {
        Some(artist) => validated_artist(&artist)?,
        None => existing.artist,
    };
    let chord_url = match req.chord_url {
        Some(raw) => validated_chord_url(Some(raw))?,
        None => existing.chord_url,
    };
    let duration_ms = match req.duration_ms {
        Some(duration) => validated_duration(Some(duration))?,
        None => existing.duration_ms,
    };

    let song = Song {
        id: existing.id,
        user_id: existing.user_id,
        title,
        artist,
        chord_url,
        duration_ms,
        // Not settable through the API; only imports assign it
        catalog_track_id: existing.catalog_track_id,
        created_at: existing.created_at,
    };

    state.db.update_song(&song).await?;

    Ok(Json(song.into()))
}

/// GET /songs/:id/chords
/// Fetch the chord sheet text behind the song's chord link
///
/// Fetched on demand, never stored; the chord host is the source of
/// truth for the sheet.
pub async fn get_song_chords(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ChordSheetResponse>, AppError> {
    let song = state
        .db
        .get_song(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let chord_url = song.chord_url.ok_or_else(|| {
        AppError::Validation("Song has no chord URL.".to_string())
    })?;

    let content = state.chords.fetch_chord_sheet(&chord_url).await?;

    Ok(Json(ChordSheetResponse {
        song_id: song.id,
        chord_url,
        content,
    }))
}

/// DELETE /songs/:id
/// Delete a song; any setlists holding it are resequenced
pub async fn delete_song(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_song(&session.user_id, &id).await?;

    if !deleted {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Build the song catalog router
pub fn songs_router() -> Router<AppState> {
    Router::new()
        .route("/songs", get(list_songs).post(create_song))
        .route(
            "/songs/:id",
            get(get_song).put(update_song).delete(delete_song),
        )
        .route("/songs/:id/chords", get(get_song_chords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_trimmed_and_required() {
        assert_eq!(validated_title("  Wonderwall ").unwrap(), "Wonderwall");
        assert!(validated_title("   ").is_err());
        assert!(validated_title(&"x".repeat(MAX_TITLE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_chord_url_rules() {
        assert_eq!(
            validated_chord_url(Some("https://tabs.example.com/w".to_string())).unwrap(),
            Some("https://tabs.example.com/w".to_string())
        );
        assert_eq!(validated_chord_url(Some("   ".to_string())).unwrap(), None);
        assert_eq!(validated_chord_url(None).unwrap(), None);
        assert!(validated_chord_url(Some("not a url".to_string())).is_err());
    }

    #[test]
    fn test_duration_must_not_be_negative() {
        assert_eq!(validated_duration(Some(0)).unwrap(), Some(0));
        assert!(validated_duration(Some(-1)).is_err());
    }
}
