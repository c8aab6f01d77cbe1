//! Account authentication
//!
//! Handles:
//! - Registration and login with Argon2 password hashing
//! - Session management
//! - Authentication middleware

mod handlers;
mod middleware;
pub mod session;

use axum::{Router, routing::get, routing::post};

use crate::AppState;

pub use middleware::CurrentUser;
pub use session::{Session, create_session_token, verify_session_token};

/// Build the authentication router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
}
