//! SQLite database operations
//!
//! All database access goes through this module. Multi-statement
//! operations that must preserve the contiguous 1..N position
//! invariant run as raw BEGIN IMMEDIATE transactions on a single
//! acquired connection, so concurrent mutations of one setlist
//! serialize at the database level.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use super::models::*;
use crate::error::AppError;

/// Random bytes per public link token (256 bits, 43 chars base64url)
const PUBLIC_TOKEN_BYTES: usize = 32;

/// Gap between live positions and the staging range used while
/// renumbering, so neither pass can collide with the other
const POSITION_STAGING_GAP: i64 = 1000;

fn generate_public_token() -> String {
    let mut bytes = [0u8; PUBLIC_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn escape_like_pattern(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

fn song_from_joined_row(row: &sqlx::sqlite::SqliteRow) -> Result<Song, sqlx::Error> {
    Ok(Song {
        id: row.try_get("song_id")?,
        user_id: row.try_get("song_user_id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        chord_url: row.try_get("chord_url")?,
        duration_ms: row.try_get("duration_ms")?,
        catalog_track_id: row.try_get("catalog_track_id")?,
        created_at: row.try_get("song_created_at")?,
    })
}

/// Renumber the given items to positions 1..N, in the given order.
///
/// Runs two passes: positions are first staged above every live
/// position (`count + POSITION_STAGING_GAP + rank`), then written to
/// their final 1-based rank. The (setlist_id, position) unique index
/// holds at every intermediate row write.
async fn renumber_items(
    conn: &mut SqliteConnection,
    ordered_item_ids: &[String],
) -> Result<(), AppError> {
    let staging_offset = ordered_item_ids.len() as i64 + POSITION_STAGING_GAP;

    for (index, item_id) in ordered_item_ids.iter().enumerate() {
        sqlx::query("UPDATE setlist_items SET position = ? WHERE id = ?")
            .bind(staging_offset + index as i64 + 1)
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
    }

    for (index, item_id) in ordered_item_ids.iter().enumerate() {
        sqlx::query("UPDATE setlist_items SET position = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(item_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Close position gaps in one setlist, keeping the current order.
async fn resequence_setlist(conn: &mut SqliteConnection, setlist_id: &str) -> Result<(), AppError> {
    let item_ids = sqlx::query_scalar::<_, String>(
        "SELECT id FROM setlist_items WHERE setlist_id = ? ORDER BY position ASC",
    )
    .bind(setlist_id)
    .fetch_all(&mut *conn)
    .await?;

    renumber_items(conn, &item_ids).await
}

/// Bump a setlist's updated_at; called by every structural mutation.
async fn touch_setlist(conn: &mut SqliteConnection, setlist_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE setlists SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(setlist_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Database connection pool wrapper.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database and run migrations
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user
    ///
    /// # Errors
    /// Returns `Validation` when the email is already registered
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Validation(
                "A user with this email already exists.".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Look up a user by email (case-insensitive, column is NOCASE)
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    // =========================================================================
    // Songs
    // =========================================================================

    /// Insert a new song
    ///
    /// # Errors
    /// Returns `Validation` when the catalog track id is already taken
    /// for this owner
    pub async fn insert_song(&self, song: &Song) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO songs (
                id, user_id, title, artist, chord_url, duration_ms,
                catalog_track_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.id)
        .bind(&song.user_id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.chord_url)
        .bind(song.duration_ms)
        .bind(&song.catalog_track_id)
        .bind(&song.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Validation(
                "A song with this catalog track id already exists.".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// Get a song owned by the given user
    pub async fn get_song(&self, user_id: &str, song_id: &str) -> Result<Option<Song>, AppError> {
        let song = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = ? AND user_id = ?")
            .bind(song_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    /// List songs for one owner, optionally filtered by a
    /// case-insensitive substring over title and artist
    pub async fn list_songs(
        &self,
        user_id: &str,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Song>, AppError> {
        let songs = match search.filter(|term| !term.is_empty()) {
            Some(term) => {
                // LIKE wildcards in the search term must match literally
                let pattern = format!("%{}%", escape_like_pattern(term));
                sqlx::query_as::<_, Song>(
                    r#"
                    SELECT * FROM songs
                    WHERE user_id = ?
                      AND (title LIKE ? ESCAPE '\' OR artist LIKE ? ESCAPE '\')
                    ORDER BY title COLLATE NOCASE ASC, id ASC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(&pattern)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Song>(
                    r#"
                    SELECT * FROM songs
                    WHERE user_id = ?
                    ORDER BY title COLLATE NOCASE ASC, id ASC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(songs)
    }

    pub async fn count_songs(&self, user_id: &str, search: Option<&str>) -> Result<i64, AppError> {
        let count = match search.filter(|term| !term.is_empty()) {
            Some(term) => {
                let pattern = format!("%{}%", escape_like_pattern(term));
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT COUNT(*) FROM songs
                    WHERE user_id = ?
                      AND (title LIKE ? ESCAPE '\' OR artist LIKE ? ESCAPE '\')
                    "#,
                )
                .bind(user_id)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM songs WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count)
    }

    /// Update a song's editable fields
    pub async fn update_song(&self, song: &Song) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET title = ?, artist = ?, chord_url = ?, duration_ms = ?, catalog_track_id = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.chord_url)
        .bind(song.duration_ms)
        .bind(&song.catalog_track_id)
        .bind(&song.id)
        .bind(&song.user_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Validation(
                "A song with this catalog track id already exists.".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// Delete a song and close the position gaps it leaves behind.
    ///
    /// Foreign keys cascade the song's setlist items (and audience
    /// requests that resolved to it); every affected setlist is then
    /// resequenced back to 1..N in the same transaction.
    ///
    /// # Returns
    /// `false` if the song does not exist for this owner
    pub async fn delete_song(&self, user_id: &str, song_id: &str) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<bool, AppError> = async {
            let owned =
                sqlx::query_scalar::<_, String>("SELECT id FROM songs WHERE id = ? AND user_id = ?")
                    .bind(song_id)
                    .bind(user_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            if owned.is_none() {
                return Ok(false);
            }

            let affected_setlists = sqlx::query_scalar::<_, String>(
                "SELECT DISTINCT setlist_id FROM setlist_items WHERE song_id = ?",
            )
            .bind(song_id)
            .fetch_all(&mut *conn)
            .await?;

            sqlx::query("DELETE FROM songs WHERE id = ?")
                .bind(song_id)
                .execute(&mut *conn)
                .await?;

            for setlist_id in &affected_setlists {
                resequence_setlist(&mut conn, setlist_id).await?;
                touch_setlist(&mut conn, setlist_id).await?;
            }

            Ok(true)
        }
        .await;

        match result {
            Ok(deleted) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(deleted)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    // =========================================================================
    // Setlists
    // =========================================================================

    pub async fn insert_setlist(&self, setlist: &Setlist) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO setlists (id, user_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&setlist.id)
        .bind(&setlist.user_id)
        .bind(&setlist.name)
        .bind(&setlist.created_at)
        .bind(&setlist.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a setlist owned by the given user
    pub async fn get_setlist(
        &self,
        user_id: &str,
        setlist_id: &str,
    ) -> Result<Option<Setlist>, AppError> {
        let setlist =
            sqlx::query_as::<_, Setlist>("SELECT * FROM setlists WHERE id = ? AND user_id = ?")
                .bind(setlist_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(setlist)
    }

    /// Get a setlist by id alone; public-link resolution only
    pub async fn get_setlist_by_id(&self, setlist_id: &str) -> Result<Option<Setlist>, AppError> {
        let setlist = sqlx::query_as::<_, Setlist>("SELECT * FROM setlists WHERE id = ?")
            .bind(setlist_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(setlist)
    }

    /// List an owner's setlists, most recently touched first
    pub async fn list_setlists(&self, user_id: &str) -> Result<Vec<Setlist>, AppError> {
        let setlists = sqlx::query_as::<_, Setlist>(
            "SELECT * FROM setlists WHERE user_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(setlists)
    }

    /// Rename a setlist
    ///
    /// # Returns
    /// `false` if the setlist does not exist for this owner
    pub async fn update_setlist_name(
        &self,
        user_id: &str,
        setlist_id: &str,
        name: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE setlists SET name = ?, updated_at = ? WHERE id = ? AND user_id = ?")
                .bind(name)
                .bind(Utc::now())
                .bind(setlist_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete a setlist; items, the public link, and audience requests
    /// go with it via foreign key cascade
    ///
    /// # Returns
    /// `false` if the setlist does not exist for this owner
    pub async fn delete_setlist(&self, user_id: &str, setlist_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM setlists WHERE id = ? AND user_id = ?")
            .bind(setlist_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Setlist items
    // =========================================================================

    /// Get a setlist's items with their songs, in position order
    pub async fn get_setlist_items(
        &self,
        setlist_id: &str,
    ) -> Result<Vec<SetlistItemDetail>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id AS item_id, i.position,
                   s.id AS song_id, s.user_id AS song_user_id, s.title, s.artist,
                   s.chord_url, s.duration_ms, s.catalog_track_id,
                   s.created_at AS song_created_at
            FROM setlist_items i
            JOIN songs s ON s.id = i.song_id
            WHERE i.setlist_id = ?
            ORDER BY i.position ASC
            "#,
        )
        .bind(setlist_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(SetlistItemDetail {
                id: row.try_get("item_id")?,
                position: row.try_get("position")?,
                song: song_from_joined_row(row)?,
            });
        }

        Ok(items)
    }

    /// Append a song to the end of a setlist.
    ///
    /// Duplicate check, max-position read, and insert share one
    /// transaction, so concurrent appends serialize and positions
    /// stay unique and contiguous.
    ///
    /// # Errors
    /// Returns `Conflict` when the song is already in the setlist
    pub async fn insert_setlist_item(
        &self,
        setlist_id: &str,
        song_id: &str,
    ) -> Result<SetlistItem, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<SetlistItem, AppError> = async {
            let duplicate = sqlx::query_scalar::<_, String>(
                "SELECT id FROM setlist_items WHERE setlist_id = ? AND song_id = ?",
            )
            .bind(setlist_id)
            .bind(song_id)
            .fetch_optional(&mut *conn)
            .await?;

            if duplicate.is_some() {
                return Err(AppError::Conflict(
                    "Song is already in this setlist.".to_string(),
                ));
            }

            let max_position = sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(position), 0) FROM setlist_items WHERE setlist_id = ?",
            )
            .bind(setlist_id)
            .fetch_one(&mut *conn)
            .await?;

            let item = SetlistItem {
                id: EntityId::new().0,
                setlist_id: setlist_id.to_string(),
                song_id: song_id.to_string(),
                position: max_position + 1,
            };

            sqlx::query(
                "INSERT INTO setlist_items (id, setlist_id, song_id, position) VALUES (?, ?, ?, ?)",
            )
            .bind(&item.id)
            .bind(&item.setlist_id)
            .bind(&item.song_id)
            .bind(item.position)
            .execute(&mut *conn)
            .await?;

            touch_setlist(&mut conn, setlist_id).await?;

            Ok(item)
        }
        .await;

        match result {
            Ok(item) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(item)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Remove an item and shift every later item down by one.
    ///
    /// Ownership is checked through the parent setlist inside the same
    /// transaction. Trailing items are decremented one row at a time in
    /// ascending position order: each decrement lands on the slot just
    /// vacated, so the (setlist_id, position) unique index never
    /// collides. SQLite enforces UNIQUE per row, not per statement, so
    /// a bulk `position = position - 1` is not safe here.
    ///
    /// # Returns
    /// `false` if the item does not exist under this owner
    pub async fn delete_setlist_item(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<bool, AppError> = async {
            let row = sqlx::query(
                r#"
                SELECT i.setlist_id, i.position
                FROM setlist_items i
                JOIN setlists l ON l.id = i.setlist_id
                WHERE i.id = ? AND l.user_id = ?
                "#,
            )
            .bind(item_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(row) = row else {
                return Ok(false);
            };
            let setlist_id: String = row.try_get("setlist_id")?;
            let removed_position: i64 = row.try_get("position")?;

            sqlx::query("DELETE FROM setlist_items WHERE id = ?")
                .bind(item_id)
                .execute(&mut *conn)
                .await?;

            let trailing_ids = sqlx::query_scalar::<_, String>(
                r#"
                SELECT id FROM setlist_items
                WHERE setlist_id = ? AND position > ?
                ORDER BY position ASC
                "#,
            )
            .bind(&setlist_id)
            .bind(removed_position)
            .fetch_all(&mut *conn)
            .await?;

            for trailing_id in &trailing_ids {
                sqlx::query("UPDATE setlist_items SET position = position - 1 WHERE id = ?")
                    .bind(trailing_id)
                    .execute(&mut *conn)
                    .await?;
            }

            touch_setlist(&mut conn, &setlist_id).await?;

            Ok(true)
        }
        .await;

        match result {
            Ok(deleted) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(deleted)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Apply a full permutation of a setlist's items.
    ///
    /// The requested id list must be exactly the current item set
    /// (same size, same members, no duplicates); validated against a
    /// snapshot read inside the write transaction, so a concurrent
    /// add or remove cannot slip between validation and renumbering.
    pub async fn reorder_setlist_items(
        &self,
        setlist_id: &str,
        ordered_item_ids: &[String],
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<(), AppError> = async {
            let current_ids = sqlx::query_scalar::<_, String>(
                "SELECT id FROM setlist_items WHERE setlist_id = ? ORDER BY position ASC",
            )
            .bind(setlist_id)
            .fetch_all(&mut *conn)
            .await?;

            let current_set: HashSet<&str> = current_ids.iter().map(String::as_str).collect();
            let requested_set: HashSet<&str> =
                ordered_item_ids.iter().map(String::as_str).collect();

            if ordered_item_ids.len() != current_ids.len() || requested_set != current_set {
                return Err(AppError::Validation(
                    "Item list does not match the setlist items.".to_string(),
                ));
            }

            renumber_items(&mut conn, ordered_item_ids).await?;
            touch_setlist(&mut conn, setlist_id).await?;

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    // =========================================================================
    // Public links
    // =========================================================================

    /// Get the setlist's public link, creating it on first call.
    ///
    /// Idempotent under races: the insert is a no-op when a row for
    /// the setlist already exists, and the read that follows returns
    /// whichever insert won.
    pub async fn get_or_create_public_link(
        &self,
        setlist_id: &str,
    ) -> Result<PublicLink, AppError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO public_links (id, setlist_id, token, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(setlist_id) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(setlist_id)
        .bind(generate_public_token())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let link =
            sqlx::query_as::<_, PublicLink>("SELECT * FROM public_links WHERE setlist_id = ?")
                .bind(setlist_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(link)
    }

    /// Resolve a token to its link; inactive links resolve to None
    pub async fn get_active_public_link(
        &self,
        token: &str,
    ) -> Result<Option<PublicLink>, AppError> {
        let link = sqlx::query_as::<_, PublicLink>(
            "SELECT * FROM public_links WHERE token = ? AND is_active = 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    // =========================================================================
    // Audience requests
    // =========================================================================

    /// Find the setlist song whose title equals the requested name,
    /// case-insensitively; lowest song id wins when titles repeat
    pub async fn find_setlist_song_by_title(
        &self,
        setlist_id: &str,
        title: &str,
    ) -> Result<Option<Song>, AppError> {
        let song = sqlx::query_as::<_, Song>(
            r#"
            SELECT s.*
            FROM songs s
            JOIN setlist_items i ON i.song_id = s.id
            WHERE i.setlist_id = ? AND s.title = ? COLLATE NOCASE
            ORDER BY s.id ASC
            LIMIT 1
            "#,
        )
        .bind(setlist_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(song)
    }

    pub async fn insert_audience_request(
        &self,
        request: &AudienceRequest,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audience_requests (
                id, setlist_id, song_id, requested_song_name, requester_name,
                client_ip, session_key, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.setlist_id)
        .bind(&request.song_id)
        .bind(&request.requested_song_name)
        .bind(&request.requester_name)
        .bind(&request.client_ip)
        .bind(&request.session_key)
        .bind(&request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a setlist's audience requests, newest first
    pub async fn get_audience_requests(
        &self,
        setlist_id: &str,
    ) -> Result<Vec<AudienceRequestDetail>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id AS request_id, r.requester_name, r.requested_song_name,
                   r.created_at AS request_created_at,
                   s.id AS song_id, s.user_id AS song_user_id, s.title, s.artist,
                   s.chord_url, s.duration_ms, s.catalog_track_id,
                   s.created_at AS song_created_at
            FROM audience_requests r
            LEFT JOIN songs s ON s.id = r.song_id
            WHERE r.setlist_id = ?
            ORDER BY r.created_at DESC, r.id DESC
            "#,
        )
        .bind(setlist_id)
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let song = match row.try_get::<Option<String>, _>("song_id")? {
                Some(_) => Some(song_from_joined_row(row)?),
                None => None,
            };

            requests.push(AudienceRequestDetail {
                id: row.try_get("request_id")?,
                requester_name: row.try_get("requester_name")?,
                requested_song_name: row.try_get("requested_song_name")?,
                song,
                created_at: row.try_get("request_created_at")?,
            });
        }

        Ok(requests)
    }

    // =========================================================================
    // Catalog import
    // =========================================================================

    /// Create a setlist from catalog tracks in one transaction.
    ///
    /// Songs are reused per owner by catalog track id first, then by
    /// case-insensitive (title, artist); otherwise created. Reused
    /// rows get their missing catalog id / duration backfilled. A
    /// repeated track is skipped: a setlist holds a song at most once.
    /// Any failure rolls the whole import back.
    pub async fn import_playlist(
        &self,
        user_id: &str,
        name: &str,
        tracks: &[ImportedTrack],
    ) -> Result<ImportOutcome, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<ImportOutcome, AppError> = async {
            let now = Utc::now();
            let setlist = Setlist {
                id: EntityId::new().0,
                user_id: user_id.to_string(),
                name: name.to_string(),
                created_at: now,
                updated_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO setlists (id, user_id, name, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&setlist.id)
            .bind(&setlist.user_id)
            .bind(&setlist.name)
            .bind(&setlist.created_at)
            .bind(&setlist.updated_at)
            .execute(&mut *conn)
            .await?;

            let mut songs_created = 0usize;
            let mut songs_reused = 0usize;
            let mut position = 0i64;
            let mut seen_song_ids: HashSet<String> = HashSet::new();

            for track in tracks {
                let title = track.title.trim();
                if title.is_empty() {
                    continue;
                }
                let artist = track.artist.trim();
                let external_id = track
                    .external_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty());

                let existing = match external_id {
                    Some(external_id) => {
                        sqlx::query_as::<_, Song>(
                            "SELECT * FROM songs WHERE user_id = ? AND catalog_track_id = ?",
                        )
                        .bind(user_id)
                        .bind(external_id)
                        .fetch_optional(&mut *conn)
                        .await?
                    }
                    None => None,
                };
                let existing = match existing {
                    Some(song) => Some(song),
                    None => {
                        sqlx::query_as::<_, Song>(
                            r#"
                            SELECT * FROM songs
                            WHERE user_id = ?
                              AND title = ? COLLATE NOCASE
                              AND artist = ? COLLATE NOCASE
                            ORDER BY id ASC
                            LIMIT 1
                            "#,
                        )
                        .bind(user_id)
                        .bind(title)
                        .bind(artist)
                        .fetch_optional(&mut *conn)
                        .await?
                    }
                };

                let song = match existing {
                    Some(song) => {
                        songs_reused += 1;

                        let missing_catalog_id =
                            song.catalog_track_id.is_none() && external_id.is_some();
                        let missing_duration =
                            song.duration_ms.is_none() && track.duration_ms.is_some();
                        if missing_catalog_id || missing_duration {
                            sqlx::query(
                                r#"
                                UPDATE songs
                                SET catalog_track_id = COALESCE(catalog_track_id, ?),
                                    duration_ms = COALESCE(duration_ms, ?)
                                WHERE id = ?
                                "#,
                            )
                            .bind(external_id)
                            .bind(track.duration_ms)
                            .bind(&song.id)
                            .execute(&mut *conn)
                            .await?;
                        }

                        song
                    }
                    None => {
                        let song = Song {
                            id: EntityId::new().0,
                            user_id: user_id.to_string(),
                            title: title.to_string(),
                            artist: artist.to_string(),
                            chord_url: None,
                            duration_ms: track.duration_ms,
                            catalog_track_id: external_id.map(str::to_string),
                            created_at: now,
                        };

                        sqlx::query(
                            r#"
                            INSERT INTO songs (
                                id, user_id, title, artist, chord_url, duration_ms,
                                catalog_track_id, created_at
                            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(&song.id)
                        .bind(&song.user_id)
                        .bind(&song.title)
                        .bind(&song.artist)
                        .bind(&song.chord_url)
                        .bind(song.duration_ms)
                        .bind(&song.catalog_track_id)
                        .bind(&song.created_at)
                        .execute(&mut *conn)
                        .await?;

                        songs_created += 1;
                        song
                    }
                };

                // Playlists can repeat a track; a setlist cannot
                if !seen_song_ids.insert(song.id.clone()) {
                    continue;
                }

                position += 1;
                sqlx::query(
                    "INSERT INTO setlist_items (id, setlist_id, song_id, position) VALUES (?, ?, ?, ?)",
                )
                .bind(EntityId::new().0)
                .bind(&setlist.id)
                .bind(&song.id)
                .bind(position)
                .execute(&mut *conn)
                .await?;
            }

            Ok(ImportOutcome {
                setlist,
                tracks_total: tracks.len(),
                songs_created,
                songs_reused,
            })
        }
        .await;

        match result {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }
}
