//! External track catalog client
//!
//! Fetches playlists from the configured catalog provider with
//! server-side client credentials. Used by the playlist import
//! endpoint to seed setlists.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::data::ImportedTrack;
use crate::error::AppError;

/// Playlist as fetched from the catalog
#[derive(Debug, Clone)]
pub struct CatalogPlaylist {
    pub name: String,
    pub tracks: Vec<ImportedTrack>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistMeta {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<TrackItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    track: Option<TrackPayload>,
}

#[derive(Debug, Deserialize)]
struct TrackPayload {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    is_local: bool,
    #[serde(default)]
    artists: Vec<ArtistPayload>,
    duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArtistPayload {
    name: Option<String>,
}

impl TrackPayload {
    /// Convert a wire track into an import row
    ///
    /// Local files and untitled tracks are skipped.
    fn into_imported(self) -> Option<ImportedTrack> {
        if self.is_local {
            return None;
        }

        let title = self.name?.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let artist = self
            .artists
            .iter()
            .filter_map(|artist| artist.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        Some(ImportedTrack {
            external_id: self.id.filter(|id| !id.is_empty()),
            title,
            artist,
            duration_ms: self.duration_ms,
        })
    }
}

/// Catalog API client
pub struct CatalogClient {
    http_client: Arc<reqwest::Client>,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(http_client: Arc<reqwest::Client>, config: CatalogConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Fetch a short-lived API token using client credentials
    async fn fetch_access_token(&self) -> Result<String, AppError> {
        if !self.config.is_configured() {
            return Err(AppError::Validation(
                "Catalog integration is not configured on this server.".to_string(),
            ));
        }

        let response = self
            .http_client
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Catalog token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Catalog rejected the token request: HTTP {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Catalog token response malformed: {}", e)))?;

        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Catalog request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::Validation(
                "Playlist not found in the catalog.".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Catalog request rejected: HTTP {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Catalog response malformed: {}", e)))
    }

    /// Fetch one playlist with its full track list
    ///
    /// Follows the catalog's pagination until the track list is
    /// exhausted.
    pub async fn fetch_playlist(&self, playlist_id: &str) -> Result<CatalogPlaylist, AppError> {
        let access_token = self.fetch_access_token().await?;
        let api_base = self.config.api_base.trim_end_matches('/');

        let meta_url = format!("{}/playlists/{}?fields=id,name", api_base, playlist_id);
        let meta: PlaylistMeta = self.get_json(&meta_url, &access_token).await?;
        let name = meta
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Imported playlist".to_string());

        let mut tracks = Vec::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            api_base, playlist_id
        ));

        while let Some(url) = next_url {
            let page: TracksPage = self.get_json(&url, &access_token).await?;

            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .filter_map(TrackPayload::into_imported),
            );

            next_url = page.next;
        }

        tracing::info!(
            playlist_id,
            track_count = tracks.len(),
            "Fetched catalog playlist"
        );

        Ok(CatalogPlaylist { name, tracks })
    }
}
