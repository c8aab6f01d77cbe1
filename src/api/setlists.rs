//! Setlist endpoints
//!
//! Covers setlist CRUD, positioned item management, and the shared
//! audience link.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::{
    PublicLinkResponse, SetlistDetailResponse, SetlistItemResponse, SetlistResponse,
};
use crate::auth::CurrentUser;
use crate::data::{EntityId, Setlist};
use crate::error::AppError;

const MAX_NAME_CHARS: usize = 255;

/// Create or rename request
#[derive(Debug, Deserialize)]
pub struct SetlistNameRequest {
    pub name: String,
}

/// Add item request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub song_id: String,
}

/// Reorder request: every current item id in the desired order
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub item_ids: Vec<String>,
}

fn validated_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required.".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must be at most {} characters.",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

/// POST /setlists
/// Create an empty setlist
pub async fn create_setlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<SetlistNameRequest>,
) -> Result<(StatusCode, Json<SetlistResponse>), AppError> {
    let now = chrono::Utc::now();
    let setlist = Setlist {
        id: EntityId::new().to_string(),
        user_id: session.user_id,
        name: validated_name(&req.name)?,
        created_at: now,
        updated_at: now,
    };

    state.db.insert_setlist(&setlist).await?;

    Ok((StatusCode::CREATED, Json(setlist.into())))
}

/// GET /setlists
/// List the owner's setlists, most recently updated first
pub async fn list_setlists(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<SetlistResponse>>, AppError> {
    let setlists = state.db.list_setlists(&session.user_id).await?;

    Ok(Json(setlists.into_iter().map(Into::into).collect()))
}

/// GET /setlists/:id
/// Get a setlist with its ordered items
pub async fn get_setlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SetlistDetailResponse>, AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = state.db.get_setlist_items(&setlist.id).await?;

    Ok(Json(SetlistDetailResponse::new(setlist, items)))
}

/// PUT /setlists/:id
/// Rename a setlist
pub async fn update_setlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<SetlistNameRequest>,
) -> Result<Json<SetlistResponse>, AppError> {
    let name = validated_name(&req.name)?;

    let renamed = state
        .db
        .update_setlist_name(&session.user_id, &id, &name)
        .await?;
    if !renamed {
        return Err(AppError::NotFound);
    }

    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(setlist.into()))
}

/// DELETE /setlists/:id
/// Delete a setlist with its items, link, and requests
pub async fn delete_setlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_setlist(&session.user_id, &id).await?;

    if !deleted {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /setlists/:id/items
/// Append a song to the end of the setlist
pub async fn add_setlist_item(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<SetlistItemResponse>), AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    // The song must belong to the same owner
    let song = state
        .db
        .get_song(&session.user_id, &req.song_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let item = state.db.insert_setlist_item(&setlist.id, &song.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(SetlistItemResponse {
            id: item.id,
            position: item.position,
            song: song.into(),
        }),
    ))
}

/// DELETE /items/:id
/// Remove an item; later positions close the gap
pub async fn remove_setlist_item(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let removed = state.db.delete_setlist_item(&session.user_id, &id).await?;

    if !removed {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /setlists/:id/reorder
/// Apply a full permutation of the setlist's items
pub async fn reorder_setlist(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<SetlistDetailResponse>, AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    if req.item_ids.is_empty() {
        return Err(AppError::Validation(
            "Item list must not be empty.".to_string(),
        ));
    }

    state
        .db
        .reorder_setlist_items(&setlist.id, &req.item_ids)
        .await?;

    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = state.db.get_setlist_items(&setlist.id).await?;

    Ok(Json(SetlistDetailResponse::new(setlist, items)))
}

/// GET|POST /setlists/:id/audience-link
/// Fetch the shareable audience link, creating it on first use
pub async fn audience_link(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PublicLinkResponse>, AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let link = state.db.get_or_create_public_link(&setlist.id).await?;

    Ok(Json(PublicLinkResponse {
        setlist_id: link.setlist_id,
        public_url: state.config.server.public_link_url(&link.token),
        token: link.token,
        is_active: link.is_active,
    }))
}

/// Build the setlist router
pub fn setlists_router() -> Router<AppState> {
    Router::new()
        .route("/setlists", get(list_setlists).post(create_setlist))
        .route(
            "/setlists/:id",
            get(get_setlist).put(update_setlist).delete(delete_setlist),
        )
        .route("/setlists/:id/items", post(add_setlist_item))
        .route("/setlists/:id/reorder", post(reorder_setlist))
        .route(
            "/setlists/:id/audience-link",
            get(audience_link).post(audience_link),
        )
        .route("/items/:id", delete(remove_setlist_item))
}
