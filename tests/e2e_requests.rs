//! E2E tests for the public audience flow: shared links, request
//! intake, rate limiting, and the owner's queue view

mod common;

use common::TestServer;
use serde_json::Value;

/// Owner with one setlist containing "Wonderwall", shared publicly.
/// Returns (owner token, setlist id, public link token).
async fn shared_setlist(server: &TestServer) -> (String, String, String) {
    let token = server.register_account("performer@example.com").await;
    let song_id = server.create_song(&token, "Wonderwall", "Oasis").await;
    let setlist_id = server.create_setlist(&token, "Friday Gig").await;
    server.add_setlist_item(&token, &setlist_id, &song_id).await;
    let link_token = server.create_audience_link(&token, &setlist_id).await;
    (token, setlist_id, link_token)
}

#[tokio::test]
async fn test_public_setlist_view() {
    let server = TestServer::new().await;
    let (_, setlist_id, link_token) = shared_setlist(&server).await;

    let response = server
        .client
        .get(server.url(&format!("/public/{}", link_token)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["id"], setlist_id.as_str());
    assert_eq!(json["name"], "Friday Gig");

    // Unknown token
    let response = server
        .client
        .get(server.url("/public/no-such-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_request_lands_in_owner_queue() {
    let server = TestServer::new().await;
    let (token, setlist_id, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({
            "song_name": "wonderwall",
            "requester_name": "Ana"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["requested_song_name"], "wonderwall");
    assert_eq!(created["requester_name"], "Ana");
    // Case-insensitive match against the setlist
    assert_eq!(created["song"]["title"], "Wonderwall");

    let response = server
        .client
        .get(server.url(&format!("/setlists/{}/requests", setlist_id)))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let queue: Value = response.json().await.unwrap();
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["items"][0]["id"], created["id"]);
}

#[tokio::test]
async fn test_unmatched_request_is_recorded_without_song() {
    let server = TestServer::new().await;
    let (token, setlist_id, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Free Bird" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    assert!(created["song"].is_null());
    assert_eq!(created["requested_song_name"], "Free Bird");
    assert_eq!(created["requester_name"], "");

    let response = server
        .client
        .get(server.url(&format!("/setlists/{}/requests", setlist_id)))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    let queue: Value = response.json().await.unwrap();
    assert_eq!(queue["count"], 1);
    assert!(queue["items"][0]["song"].is_null());
}

#[tokio::test]
async fn test_blank_song_name_is_rejected() {
    let server = TestServer::new().await;
    let (_, _, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let json: Value = response.json().await.unwrap();
    assert!(json["detail"].as_str().unwrap().contains("Song name"));
}

#[tokio::test]
async fn test_request_to_unknown_token_is_not_found() {
    let server = TestServer::new().await;
    shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url("/public/no-such-token/requests"))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_immediate_second_request_is_rate_limited() {
    let server = TestServer::new().await;
    let (_, _, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Same browser (same session cookie) retries at once
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    let json: Value = response.json().await.unwrap();
    assert!(json["detail"].as_str().unwrap().contains("Wait"));

    // A different audience member has their own fingerprint
    let other = server.audience_client();
    let response = other
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Champagne Supernova" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_session_cookie_is_set_on_first_contact() {
    let server = TestServer::new().await;
    let (_, _, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|value| value.to_str().ok())
        .expect("session cookie on first response");
    assert!(set_cookie.starts_with("audience_session="));
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_queue_view_supports_etag_revalidation() {
    let server = TestServer::new().await;
    let (token, setlist_id, link_token) = shared_setlist(&server).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let queue_url = server.url(&format!("/setlists/{}/requests", setlist_id));

    let response = server
        .client
        .get(&queue_url)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["cache-control"], "no-cache");
    let etag = response.headers()["etag"].to_str().unwrap().to_string();

    // Unchanged queue: revalidation gets 304 with no body
    let response = server
        .client
        .get(&queue_url)
        .header("Authorization", format!("Bearer {}", token))
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 304);
    assert!(response.text().await.unwrap().is_empty());

    // A new request invalidates the tag
    let other = server.audience_client();
    let response = other
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Supersonic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = server
        .client
        .get(&queue_url)
        .header("Authorization", format!("Bearer {}", token))
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let new_etag = response.headers()["etag"].to_str().unwrap().to_string();
    let queue: Value = response.json().await.unwrap();
    assert_eq!(queue["count"], 2);
    // Newest first
    assert_eq!(queue["items"][0]["requested_song_name"], "Supersonic");
    assert_ne!(new_etag, etag);
}

#[tokio::test]
async fn test_queue_is_hidden_from_other_accounts() {
    let server = TestServer::new().await;
    let (_, setlist_id, _) = shared_setlist(&server).await;

    let intruder = server.register_account("other@example.com").await;
    let response = server
        .client
        .get(server.url(&format!("/setlists/{}/requests", setlist_id)))
        .header("Authorization", format!("Bearer {}", intruder))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_accepted_request_notifies_queue_subscribers() {
    let server = TestServer::new().await;
    let (_, setlist_id, link_token) = shared_setlist(&server).await;

    let mut events = server.state.notifier.subscribe(&setlist_id).await;

    let audience = server.audience_client();
    let response = audience
        .post(server.url(&format!("/public/{}/requests", link_token)))
        .json(&serde_json::json!({ "song_name": "Wonderwall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
        .await
        .expect("queue event within timeout")
        .unwrap();
    assert_eq!(event.setlist_id, setlist_id);
    assert_eq!(event.request_id, created["id"].as_str().unwrap());
}
