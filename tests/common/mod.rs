//! Common test utilities for E2E tests

use setlive::{build_router, config, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                public_base_url: "http://test.setlive.example".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
            },
            rate_limit: config::RateLimitConfig {
                short_window_seconds: 15,
                long_window_seconds: 600,
                long_max_requests: 20,
                max_tracked_keys: 10_000,
            },
            catalog: config::CatalogConfig {
                // Empty credentials keep the integration disabled in tests
                client_id: String::new(),
                client_secret: String::new(),
                token_url: "http://127.0.0.1:1/token".to_string(),
                api_base: "http://127.0.0.1:1".to_string(),
                timeout_seconds: 2,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config.clone()).await.unwrap();

        // Create HTTP client. The cookie store carries the audience session
        // cookie between public requests, like a browser would.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = build_router(state.clone());

        // Spawn server in background. Connect info is the production serve
        // mode; audience fingerprints read the peer address from it.
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Build an extra HTTP client with its own cookie store
    ///
    /// Simulates a second audience member: a fresh cookie store receives
    /// its own session key and therefore its own rate-limit fingerprint.
    pub fn audience_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap()
    }

    /// Register an account through the API and return its session token
    pub async fn register_account(&self, email: &str) -> String {
        let response = self
            .client
            .post(&self.url("/auth/register"))
            .json(&serde_json::json!({
                "email": email,
                "password": "correct-horse-battery",
                "first_name": "Test",
                "last_name": "Musician"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registration failed for {}", email);

        let json: Value = response.json().await.unwrap();
        json["token"].as_str().expect("token in response").to_string()
    }

    /// Create a song through the API and return its id
    pub async fn create_song(&self, token: &str, title: &str, artist: &str) -> String {
        let response = self
            .client
            .post(&self.url("/songs"))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "title": title,
                "artist": artist
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "song creation failed for {}", title);

        let json: Value = response.json().await.unwrap();
        json["id"].as_str().expect("id in response").to_string()
    }

    /// Create a setlist through the API and return its id
    pub async fn create_setlist(&self, token: &str, name: &str) -> String {
        let response = self
            .client
            .post(&self.url("/setlists"))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "setlist creation failed for {}", name);

        let json: Value = response.json().await.unwrap();
        json["id"].as_str().expect("id in response").to_string()
    }

    /// Add a song to a setlist and return the item id
    pub async fn add_setlist_item(&self, token: &str, setlist_id: &str, song_id: &str) -> String {
        let response = self
            .client
            .post(&self.url(&format!("/setlists/{}/items", setlist_id)))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "song_id": song_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "adding setlist item failed");

        let json: Value = response.json().await.unwrap();
        json["id"].as_str().expect("id in response").to_string()
    }

    /// Create the audience link for a setlist and return its token
    pub async fn create_audience_link(&self, token: &str, setlist_id: &str) -> String {
        let response = self
            .client
            .post(&self.url(&format!("/setlists/{}/audience-link", setlist_id)))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "audience link creation failed");

        let json: Value = response.json().await.unwrap();
        json["token"].as_str().expect("token in response").to_string()
    }
}
