//! Audience request queue endpoints
//!
//! The owner polls the queue with a version header so unchanged reads
//! cost one hash instead of a payload, and can subscribe to a live
//! event stream instead of polling.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::AppState;
use crate::api::dto::RequestQueueResponse;
use crate::auth::CurrentUser;
use crate::data::AudienceRequestDetail;
use crate::error::AppError;

/// Compute the queue version tag
///
/// Hashes the request count plus the newest request's id and creation
/// time; any append changes at least one of the three.
fn queue_etag(requests: &[AudienceRequestDetail]) -> String {
    use base64::{Engine as _, engine::general_purpose};
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(requests.len().to_le_bytes());
    if let Some(newest) = requests.first() {
        hasher.update(newest.id.as_bytes());
        hasher.update([0]);
        hasher.update(newest.created_at.to_rfc3339().as_bytes());
    }

    format!(
        "\"{}\"",
        general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    )
}

/// GET /setlists/:id/requests
/// Owner view of the request queue, newest first
///
/// Sends a strong ETag; a matching `If-None-Match` gets 304 with an
/// empty body.
pub async fn get_request_queue(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let requests = state.db.get_audience_requests(&setlist.id).await?;
    let etag = queue_etag(&requests);

    let cache_headers = [
        (header::ETAG, etag.clone()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
    ];

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
    {
        if if_none_match == etag {
            return Ok((StatusCode::NOT_MODIFIED, cache_headers).into_response());
        }
    }

    let body = RequestQueueResponse {
        setlist_id: setlist.id,
        count: requests.len(),
        items: requests.into_iter().map(Into::into).collect(),
    };

    Ok((StatusCode::OK, cache_headers, Json(body)).into_response())
}

/// GET /setlists/:id/requests/stream
/// Live queue events as server-sent events
pub async fn stream_request_queue(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let setlist = state
        .db
        .get_setlist(&session.user_id, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(setlist_id = %setlist.id, "Queue stream subscriber connected");

    let rx = state.notifier.subscribe(&setlist.id).await;
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(queue_event) => Event::default()
                .event("request.created")
                .json_data(&queue_event)
                .ok()
                .map(Ok),
            Err(error) => {
                // Subscriber fell behind the channel buffer; skip
                tracing::warn!(%error, "Queue stream subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

/// Build the request queue router
pub fn requests_router() -> Router<AppState> {
    Router::new()
        .route("/setlists/:id/requests", get(get_request_queue))
        .route("/setlists/:id/requests/stream", get(stream_request_queue))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detail(id: &str, created_at: chrono::DateTime<Utc>) -> AudienceRequestDetail {
        AudienceRequestDetail {
            id: id.to_string(),
            requester_name: String::new(),
            requested_song_name: "Wonderwall".to_string(),
            song: None,
            created_at,
        }
    }

    #[test]
    fn test_etag_is_quoted_and_stable() {
        let now = Utc::now();
        let queue = vec![detail("r2", now), detail("r1", now)];

        let first = queue_etag(&queue);
        assert!(first.starts_with('"') && first.ends_with('"'));
        assert_eq!(first, queue_etag(&queue));
    }

    #[test]
    fn test_etag_changes_when_queue_grows() {
        let now = Utc::now();
        let queue = vec![detail("r1", now)];
        let grown = vec![detail("r2", now), detail("r1", now)];

        assert_ne!(queue_etag(&queue), queue_etag(&grown));
        assert_ne!(queue_etag(&[]), queue_etag(&queue));
    }
}
