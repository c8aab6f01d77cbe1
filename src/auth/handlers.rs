//! Account registration and login handlers

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::middleware::CurrentUser;
use crate::auth::session::{Session, create_session_token};
use crate::data::{EntityId, User};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Hash a password with Argon2id
fn hash_password(password: &str) -> Result<String, AppError> {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash
fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("stored hash is malformed: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn issue_session(state: &AppState, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let session = Session {
        user_id: user.id.clone(),
        email: user.email.clone(),
        created_at: now,
        expires_at: now + Duration::seconds(state.config.auth.session_max_age),
    };

    create_session_token(&session, &state.config.auth.session_secret)
}

/// Create a new account
///
/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "A valid email address is required.".to_string(),
        ));
    }
    if req.password.chars().count() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters.".to_string(),
        ));
    }

    let user = User {
        id: EntityId::new().to_string(),
        email,
        password_hash: hash_password(&req.password)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        created_at: Utc::now(),
    };

    state.db.insert_user(&user).await?;
    tracing::info!(user_id = %user.id, "registered new account");

    let token = issue_session(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    ))
}

/// Log in with email and password
///
/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();

    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = issue_session(&state, &user)?;

    Ok(Json(AuthResponse {
        user: user.into(),
        token,
    }))
}

/// Return the authenticated account
///
/// `GET /auth/me`
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .get_user(&session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(UserResponse::from(user)))
}

/// Log out
///
/// `POST /auth/logout`
///
/// Tokens are stateless, so the server has nothing to revoke; the
/// client drops its copy.
pub async fn logout(CurrentUser(_session): CurrentUser) -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
