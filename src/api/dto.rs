//! API response DTOs
//!
//! Data Transfer Objects for owner and public API responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{AudienceRequestDetail, Setlist, SetlistItemDetail, Song};

/// Song response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongResponse {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub chord_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub catalog_track_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Song> for SongResponse {
    fn from(song: Song) -> Self {
        Self {
            id: song.id,
            title: song.title,
            artist: song.artist,
            chord_url: song.chord_url,
            duration_ms: song.duration_ms,
            catalog_track_id: song.catalog_track_id,
            created_at: song.created_at,
        }
    }
}

/// Setlist summary response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetlistResponse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Setlist> for SetlistResponse {
    fn from(setlist: Setlist) -> Self {
        Self {
            id: setlist.id,
            name: setlist.name,
            created_at: setlist.created_at,
            updated_at: setlist.updated_at,
        }
    }
}

/// One positioned song inside a setlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetlistItemResponse {
    pub id: String,
    pub position: i64,
    pub song: SongResponse,
}

impl From<SetlistItemDetail> for SetlistItemResponse {
    fn from(item: SetlistItemDetail) -> Self {
        Self {
            id: item.id,
            position: item.position,
            song: item.song.into(),
        }
    }
}

/// Setlist with its ordered items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetlistDetailResponse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<SetlistItemResponse>,
}

impl SetlistDetailResponse {
    pub fn new(setlist: Setlist, items: Vec<SetlistItemDetail>) -> Self {
        Self {
            id: setlist.id,
            name: setlist.name,
            created_at: setlist.created_at,
            updated_at: setlist.updated_at,
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Paginated collection response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total: i64) -> Self {
        let has_next = i64::from(page) * i64::from(page_size) < total;
        Self {
            items,
            page,
            page_size,
            total,
            has_previous: page > 1,
            has_next,
        }
    }
}

/// Shareable audience link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicLinkResponse {
    pub setlist_id: String,
    pub token: String,
    pub public_url: String,
    pub is_active: bool,
}

/// Audience request as shown to the owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceRequestResponse {
    pub id: String,
    pub requester_name: String,
    pub requested_song_name: String,
    pub song: Option<SongResponse>,
    pub created_at: DateTime<Utc>,
}

impl From<AudienceRequestDetail> for AudienceRequestResponse {
    fn from(request: AudienceRequestDetail) -> Self {
        Self {
            id: request.id,
            requester_name: request.requester_name,
            requested_song_name: request.requested_song_name,
            song: request.song.map(Into::into),
            created_at: request.created_at,
        }
    }
}

/// Request queue for one setlist, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestQueueResponse {
    pub setlist_id: String,
    pub count: usize,
    pub items: Vec<AudienceRequestResponse>,
}

/// Setlist as shown to the audience
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicSetlistResponse {
    pub id: String,
    pub name: String,
}

/// Chord sheet fetched from a song's chord link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordSheetResponse {
    pub song_id: String,
    pub chord_url: String,
    pub content: String,
}

/// Outcome of a playlist import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistImportResponse {
    pub setlist_id: String,
    pub setlist_name: String,
    pub tracks_total: usize,
    pub songs_created: usize,
    pub songs_reused: usize,
}
