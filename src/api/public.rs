//! Public audience endpoints
//!
//! Reached through the shared link token; no account required.

use std::net::SocketAddr;

use axum::{
    Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::RngCore;
use serde::Deserialize;

use crate::AppState;
use crate::api::dto::{AudienceRequestResponse, PublicSetlistResponse};
use crate::error::AppError;
use crate::service::Fingerprint;

/// Cookie that ties one audience member's requests together
const SESSION_COOKIE: &str = "audience_session";

/// Audience request payload
#[derive(Debug, Deserialize)]
pub struct AudienceRequestCreate {
    pub song_name: String,
    #[serde(default)]
    pub requester_name: String,
}

/// First `X-Forwarded-For` value, else the peer address
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Some(first.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

/// Read the audience session cookie, assigning one if absent
fn ensure_session_cookie(jar: CookieJar) -> (String, CookieJar) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let value = cookie.value();
        if !value.is_empty() {
            return (value.to_string(), jar);
        }
    }

    use base64::{Engine as _, engine::general_purpose};
    let mut bytes = [0_u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let session_key = general_purpose::URL_SAFE_NO_PAD.encode(bytes);

    let cookie = Cookie::build((SESSION_COOKIE, session_key.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    (session_key, jar.add(cookie))
}

/// GET /public/:token
/// Resolve a shared link to its setlist
pub async fn get_public_setlist(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicSetlistResponse>, AppError> {
    let setlist = state.intake.resolve_link(&token).await?;

    Ok(Json(PublicSetlistResponse {
        id: setlist.id,
        name: setlist.name,
    }))
}

/// POST /public/:token/requests
/// Submit an audience request
///
/// The session cookie is attached to every response, including
/// rejections, so a retry carries a stable fingerprint.
pub async fn submit_audience_request(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<AudienceRequestCreate>,
) -> Response {
    let (session_key, jar) = ensure_session_cookie(jar);
    let fingerprint = Fingerprint {
        client_ip: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        session_key,
    };

    let result = state
        .intake
        .submit_request(&token, &req.song_name, &req.requester_name, &fingerprint)
        .await;

    match result {
        Ok(detail) => (
            jar,
            (
                StatusCode::CREATED,
                Json(AudienceRequestResponse::from(detail)),
            ),
        )
            .into_response(),
        Err(error) => (jar, error).into_response(),
    }
}

/// Build the public router
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/public/:token", get(get_public_setlist))
        .route("/public/:token/requests", post(submit_audience_request))
}
