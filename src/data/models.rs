//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered account (musician / setlist owner)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC-format hash, never serialized to clients
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Song
// =============================================================================

/// A song in an owner's repertoire
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Song {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub artist: String,
    /// Link to chord sheet / tab
    pub chord_url: Option<String>,
    pub duration_ms: Option<i64>,
    /// External catalog track id, unique per owner when present
    pub catalog_track_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Setlist
// =============================================================================

/// An ordered collection of songs for a performance
///
/// `updated_at` is bumped by every structural mutation (rename,
/// item add/remove/reorder), so clients can sort by freshness.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setlist {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of a song in a setlist
///
/// Positions within one setlist are contiguous 1..N at rest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SetlistItem {
    pub id: String,
    pub setlist_id: String,
    pub song_id: String,
    pub position: i64,
}

/// Setlist item joined with its song, as served in detail views
#[derive(Debug, Clone)]
pub struct SetlistItemDetail {
    pub id: String,
    pub position: i64,
    pub song: Song,
}

// =============================================================================
// Public link
// =============================================================================

/// Shareable audience link for one setlist
///
/// One row per setlist; the token is the only capability needed to
/// view the setlist and submit requests.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicLink {
    pub id: String,
    pub setlist_id: String,
    pub token: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Audience request
// =============================================================================

/// A song request submitted through a public link
///
/// Append-only: rows are never mutated after insert. `song_id` is the
/// resolved repertoire song when the requested title matched one,
/// otherwise null. The ip/session fields exist only for rate-limit
/// fingerprinting and are never exposed to clients.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AudienceRequest {
    pub id: String,
    pub setlist_id: String,
    pub song_id: Option<String>,
    pub requested_song_name: String,
    pub requester_name: String,
    pub client_ip: Option<String>,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}

/// Audience request joined with its resolved song, for queue views
#[derive(Debug, Clone)]
pub struct AudienceRequestDetail {
    pub id: String,
    pub requester_name: String,
    pub requested_song_name: String,
    pub song: Option<Song>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Catalog import
// =============================================================================

/// A track fetched from the external catalog, pre-normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedTrack {
    pub external_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub duration_ms: Option<i64>,
}

/// Result of an atomic playlist import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub setlist: Setlist,
    pub tracks_total: usize,
    pub songs_created: usize,
    pub songs_reused: usize,
}
