//! Catalog import endpoint

use axum::{Router, extract::State, http::StatusCode, response::Json, routing::post};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::PlaylistImportResponse;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// Import request
#[derive(Debug, Deserialize)]
pub struct ImportPlaylistRequest {
    pub playlist_id: String,
    /// Optional setlist name; defaults to the playlist's name
    pub name: Option<String>,
}

/// POST /catalog/import
/// Create a setlist from an external playlist
pub async fn import_playlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<ImportPlaylistRequest>,
) -> Result<(StatusCode, Json<PlaylistImportResponse>), AppError> {
    let playlist_id = req.playlist_id.trim();
    if playlist_id.is_empty() {
        return Err(AppError::Validation("playlist_id is required.".to_string()));
    }

    let playlist = state.catalog.fetch_playlist(playlist_id).await?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&playlist.name);

    let outcome = state
        .db
        .import_playlist(&session.user_id, name, &playlist.tracks)
        .await?;

    tracing::info!(
        setlist_id = %outcome.setlist.id,
        tracks = outcome.tracks_total,
        created = outcome.songs_created,
        reused = outcome.songs_reused,
        "Imported playlist"
    );

    Ok((
        StatusCode::CREATED,
        Json(PlaylistImportResponse {
            setlist_id: outcome.setlist.id,
            setlist_name: outcome.setlist.name,
            tracks_total: outcome.tracks_total,
            songs_created: outcome.songs_created,
            songs_reused: outcome.songs_reused,
        }),
    ))
}

/// Build the catalog router
pub fn catalog_router() -> Router<AppState> {
    Router::new().route("/catalog/import", post(import_playlist))
}
