//! Audience request intake
//!
//! Runs the public request pipeline: resolve the shared link, validate
//! the payload, match the requested title against the setlist, pass
//! admission control, persist, and notify queue subscribers.

use std::sync::Arc;

use crate::data::{AudienceRequest, AudienceRequestDetail, Database, EntityId, Setlist};
use crate::error::AppError;
use crate::notify::{QueueEvent, QueueNotifier};
use crate::service::admission::{AudienceRateLimiter, Fingerprint};

const MAX_SONG_NAME_CHARS: usize = 255;
const MAX_REQUESTER_NAME_CHARS: usize = 80;

/// Audience intake service
pub struct IntakeService {
    db: Arc<Database>,
    limiter: Arc<AudienceRateLimiter>,
    notifier: Arc<QueueNotifier>,
}

impl IntakeService {
    pub fn new(
        db: Arc<Database>,
        limiter: Arc<AudienceRateLimiter>,
        notifier: Arc<QueueNotifier>,
    ) -> Self {
        Self {
            db,
            limiter,
            notifier,
        }
    }

    /// Resolve a public token to its setlist
    ///
    /// # Errors
    /// Returns `NotFound` when the token is unknown or the link has
    /// been deactivated
    pub async fn resolve_link(&self, token: &str) -> Result<Setlist, AppError> {
        let link = self
            .db
            .get_active_public_link(token)
            .await?
            .ok_or(AppError::NotFound)?;

        self.db
            .get_setlist_by_id(&link.setlist_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Accept one audience request submitted through a public link
    ///
    /// The requested title is matched case-insensitively against songs
    /// currently in the setlist; an unmatched title is still accepted
    /// with no resolved song. Nothing is persisted when validation or
    /// admission fails.
    pub async fn submit_request(
        &self,
        token: &str,
        song_name: &str,
        requester_name: &str,
        fingerprint: &Fingerprint,
    ) -> Result<AudienceRequestDetail, AppError> {
        let setlist = self.resolve_link(token).await?;

        let requested_song_name = song_name.trim();
        if requested_song_name.is_empty() {
            return Err(AppError::Validation("Song name is required.".to_string()));
        }
        if requested_song_name.chars().count() > MAX_SONG_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "Song name must be at most {} characters.",
                MAX_SONG_NAME_CHARS
            )));
        }

        let requester_name = requester_name.trim();
        if requester_name.chars().count() > MAX_REQUESTER_NAME_CHARS {
            return Err(AppError::Validation(format!(
                "Requester name must be at most {} characters.",
                MAX_REQUESTER_NAME_CHARS
            )));
        }

        let matched_song = self
            .db
            .find_setlist_song_by_title(&setlist.id, requested_song_name)
            .await?;

        self.limiter.check_and_admit(&setlist.id, fingerprint).await?;

        let request = AudienceRequest {
            id: EntityId::new().to_string(),
            setlist_id: setlist.id.clone(),
            song_id: matched_song.as_ref().map(|song| song.id.clone()),
            requested_song_name: requested_song_name.to_string(),
            requester_name: requester_name.to_string(),
            client_ip: fingerprint.client_ip.clone(),
            session_key: fingerprint.session_key.clone(),
            created_at: chrono::Utc::now(),
        };
        self.db.insert_audience_request(&request).await?;

        tracing::info!(
            setlist_id = %setlist.id,
            request_id = %request.id,
            matched = matched_song.is_some(),
            "Audience request accepted"
        );

        self.notifier
            .publish(QueueEvent {
                setlist_id: setlist.id,
                request_id: request.id.clone(),
                created_at: request.created_at,
            })
            .await;

        Ok(AudienceRequestDetail {
            id: request.id,
            requester_name: request.requester_name,
            requested_song_name: request.requested_song_name,
            song: matched_song,
            created_at: request.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::data::{Setlist, Song, User};
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Arc<Database>,
        service: IntakeService,
        token: String,
        setlist_id: String,
    }

    async fn fixture(rate_limit: RateLimitConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&dir.path().join("intake_test.db"))
                .await
                .unwrap(),
        );

        let user = User {
            id: EntityId::new().to_string(),
            email: format!("{}@example.com", EntityId::new()),
            password_hash: "x".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            created_at: Utc::now(),
        };
        db.insert_user(&user).await.unwrap();

        let setlist = Setlist {
            id: EntityId::new().to_string(),
            user_id: user.id.clone(),
            name: "Friday Night".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.insert_setlist(&setlist).await.unwrap();

        let song = Song {
            id: EntityId::new().to_string(),
            user_id: user.id.clone(),
            title: "Wonderwall".to_string(),
            artist: "Oasis".to_string(),
            chord_url: None,
            duration_ms: None,
            catalog_track_id: None,
            created_at: Utc::now(),
        };
        db.insert_song(&song).await.unwrap();
        db.insert_setlist_item(&setlist.id, &song.id).await.unwrap();

        let link = db.get_or_create_public_link(&setlist.id).await.unwrap();

        let service = IntakeService::new(
            db.clone(),
            Arc::new(AudienceRateLimiter::new(&rate_limit)),
            Arc::new(QueueNotifier::new()),
        );

        Fixture {
            _dir: dir,
            db,
            service,
            token: link.token,
            setlist_id: setlist.id,
        }
    }

    fn relaxed_limits() -> RateLimitConfig {
        RateLimitConfig {
            short_window_seconds: 600,
            long_window_seconds: 600,
            long_max_requests: 100,
            max_tracked_keys: 100,
        }
    }

    fn fingerprint(session_key: &str) -> Fingerprint {
        Fingerprint {
            client_ip: Some("198.51.100.4".to_string()),
            session_key: session_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_request_matches_song_case_insensitively() {
        let fx = fixture(relaxed_limits()).await;

        let detail = fx
            .service
            .submit_request(&fx.token, "  wonderwall ", "Ana", &fingerprint("a"))
            .await
            .unwrap();

        assert_eq!(detail.requested_song_name, "wonderwall");
        assert_eq!(detail.song.as_ref().unwrap().title, "Wonderwall");
        assert_eq!(detail.requester_name, "Ana");
    }

    #[tokio::test]
    async fn test_unmatched_title_is_accepted_without_song() {
        let fx = fixture(relaxed_limits()).await;

        let detail = fx
            .service
            .submit_request(&fx.token, "Free Bird", "", &fingerprint("a"))
            .await
            .unwrap();

        assert!(detail.song.is_none());
        assert_eq!(detail.requested_song_name, "Free Bird");
    }

    #[tokio::test]
    async fn test_blank_song_name_is_rejected() {
        let fx = fixture(relaxed_limits()).await;

        let err = fx
            .service
            .submit_request(&fx.token, "   ", "Ana", &fingerprint("a"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_overlong_names_are_rejected() {
        let fx = fixture(relaxed_limits()).await;

        let long_song = "x".repeat(MAX_SONG_NAME_CHARS + 1);
        let err = fx
            .service
            .submit_request(&fx.token, &long_song, "Ana", &fingerprint("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let long_name = "x".repeat(MAX_REQUESTER_NAME_CHARS + 1);
        let err = fx
            .service
            .submit_request(&fx.token, "Wonderwall", &long_name, &fingerprint("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let fx = fixture(relaxed_limits()).await;

        let err = fx
            .service
            .submit_request("no-such-token", "Wonderwall", "", &fingerprint("a"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_persisted() {
        let fx = fixture(RateLimitConfig {
            short_window_seconds: 600,
            long_window_seconds: 600,
            long_max_requests: 1,
            max_tracked_keys: 100,
        })
        .await;

        fx.service
            .submit_request(&fx.token, "Wonderwall", "Ana", &fingerprint("a"))
            .await
            .unwrap();

        // Same fingerprint is now rate limited; a different session key
        // is not, proving the windows are per requester
        let err = fx
            .service
            .submit_request(&fx.token, "Wonderwall", "Ana", &fingerprint("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited(_)));

        fx.service
            .submit_request(&fx.token, "Wonderwall", "Bea", &fingerprint("b"))
            .await
            .unwrap();

        let requests = fx.db.get_audience_requests(&fx.setlist_id).await.unwrap();
        assert_eq!(requests.len(), 2);
    }
}
