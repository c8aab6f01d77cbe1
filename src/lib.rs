//! Setlive - a setlist and audience request backend for live musicians
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Owner endpoints (songs, setlists, queue, import)         │
//! │  - Public audience endpoints (shared links, intake)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Audience intake pipeline                                 │
//! │  - Admission control (dual-window rate limiting)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for owner and public endpoints
//! - `service`: Business logic layer
//! - `data`: Database layer
//! - `auth`: Account registration, login, and session middleware
//! - `catalog`: External track catalog client (playlist import)
//! - `chords`: Chord sheet fetcher (song chord links)
//! - `notify`: Queue event broadcast for live owner dashboards
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod catalog;
pub mod chords;
pub mod config;
pub mod data;
pub mod error;
pub mod notify;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool and rate limiter.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Admission control for the public intake
    pub limiter: Arc<service::AudienceRateLimiter>,

    /// Queue event broadcast hub
    pub notifier: Arc<notify::QueueNotifier>,

    /// Audience intake pipeline
    pub intake: Arc<service::IntakeService>,

    /// External catalog client
    pub catalog: Arc<catalog::CatalogClient>,

    /// Chord sheet fetcher
    pub chords: Arc<chords::ChordClient>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Build the admission limiter and queue notifier
    /// 3. Initialize the catalog and chord sheet clients
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        use std::path::Path;

        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = data::Database::connect(Path::new(&config.database.path)).await?;
        tracing::info!("Database connected");

        // 2. Admission control and queue notifications
        let limiter = Arc::new(service::AudienceRateLimiter::new(&config.rate_limit));
        let notifier = Arc::new(notify::QueueNotifier::new());

        // 3. Shared HTTP client for the catalog integration and chord
        //    sheet fetches
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent("Setlive/0.1.0")
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );
        let catalog = Arc::new(catalog::CatalogClient::new(
            http_client.clone(),
            config.catalog.clone(),
        ));
        let chords = Arc::new(chords::ChordClient::new(http_client));
        if config.catalog.is_configured() {
            tracing::info!("Catalog integration enabled");
        } else {
            tracing::info!("Catalog integration disabled (no client credentials)");
        }

        let db = Arc::new(db);
        let intake = Arc::new(service::IntakeService::new(
            db.clone(),
            limiter.clone(),
            notifier.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            limiter,
            notifier,
            intake,
            catalog,
            chords,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    // Requests are small JSON payloads; anything near this limit is abuse
    const MAX_BODY_BYTES: usize = 64 * 1024;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::songs_router())
        .merge(api::setlists_router())
        .merge(api::requests_router())
        .merge(api::catalog_router())
        .merge(api::public_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.public_base_url.starts_with("https://") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.public_base_url.trim_end_matches('/').to_string();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from public base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
