//! Accounts and sessions. Passwords are stored as Argon2id hashes, sessions
//! are DB-backed cookie tokens, and the admin flag is re-read from the users
//! table on every privileged request rather than trusted from login time.
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{audit, error::AppError, models::User, state::AppState};

pub const SESSION_COOKIE: &str = "storefront_session";

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

fn email_is_valid(email: &str) -> bool {
    let re = Regex::new(EMAIL_PATTERN).unwrap();
    re.is_match(email)
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AppError::PasswordHash)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub order_count: i64,
}

/// Creates an account, collecting every violated rule instead of stopping at
/// the first one.
pub async fn register_user(pool: &SqlitePool, req: &RegisterRequest) -> Result<User, AppError> {
    let mut errors = Vec::new();

    if req.username.trim().len() < 3 {
        errors.push("username must be at least 3 characters".to_string());
    }
    if !email_is_valid(&req.email) {
        errors.push("email address is not valid".to_string());
    }
    if req.password.len() < 6 {
        errors.push("password must be at least 6 characters".to_string());
    }
    if req.password != req.confirm_password {
        errors.push("passwords do not match".to_string());
    }

    let existing = sqlx::query_as::<_, (String, String)>(
        "SELECT username, email FROM users WHERE username = ?1 OR email = ?2",
    )
    .bind(&req.username)
    .bind(&req.email)
    .fetch_all(pool)
    .await?;

    for (username, email) in &existing {
        if *username == req.username {
            errors.push("username is already taken".to_string());
        }
        if *email == req.email {
            errors.push("email is already registered".to_string());
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let password_hash = hash_password(&req.password)?;

    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash, full_name, is_admin, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)
         RETURNING id",
    )
    .bind(&req.username)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.full_name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    fetch_user(pool, user_id).await
}

/// Looks an account up by username or email and checks the password. Both
/// misses collapse into the same error.
pub async fn authenticate(
    pool: &SqlitePool,
    identifier: &str,
    password: &str,
) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?1 OR email = ?1")
        .bind(identifier)
        .fetch_optional(pool)
        .await?;

    match user {
        Some(user) if verify_password(&user.password_hash, password) => Ok(user),
        _ => Err(AppError::InvalidCredentials),
    }
}

pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    ttl_hours: i64,
) -> Result<String, AppError> {
    // Expired rows are dead weight, sweep them while we are here.
    sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    let token = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);

    sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

async fn fetch_user(pool: &SqlitePool, user_id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("user"))
}

async fn session_user(pool: &SqlitePool, token: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u
         JOIN sessions s ON s.user_id = u.id
         WHERE s.id = ?1 AND s.expires_at > ?2",
    )
    .bind(token)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// The requesting account, resolved from the session cookie. Rejects with
/// 401 when the cookie is missing, unknown or expired.
pub struct AuthUser(pub User);

/// Like [`AuthUser`] but additionally requires the freshly loaded row to
/// carry the admin flag. Rejects with 403 otherwise.
pub struct AdminUser(pub User);

/// Optional variant of [`AuthUser`] for routes that behave differently for
/// logged-in visitors but never reject.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .unwrap_or_default();

        let token = jar
            .get(SESSION_COOKIE)
            .ok_or(AppError::Unauthorized)?
            .value()
            .to_string();

        session_user(&state.pool, &token)
            .await?
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            return Err(AppError::Forbidden);
        }

        Ok(AdminUser(user))
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = match AuthUser::from_request_parts(parts, state).await {
            Ok(AuthUser(user)) => Some(user),
            Err(_) => None,
        };

        Ok(MaybeUser(user))
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<User>), AppError> {
    let user = register_user(&state.pool, &req).await?;

    let token = create_session(&state.pool, user.id, state.config.session_ttl_hours).await?;
    audit::record(&state.pool, Some(user.id), "register", None, None).await?;

    info!("Registered user {}", user.username);

    Ok((jar.add(session_cookie(token)), Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<User>), AppError> {
    let user = authenticate(&state.pool, &req.identifier, &req.password).await?;

    let token = create_session(&state.pool, user.id, state.config.session_ttl_hours).await?;
    audit::record(&state.pool, Some(user.id), "login", None, None).await?;

    Ok((jar.add(session_cookie(token)), Json(user)))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> Result<CookieJar, AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(cookie.value())
            .execute(&state.pool)
            .await?;
    }

    audit::record(&state.pool, Some(user.id), "logout", None, None).await?;

    Ok(jar.remove(removal_cookie()))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?1")
        .bind(user.id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ProfileResponse { user, order_count }))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let mut errors = Vec::new();

    if !email_is_valid(&req.email) {
        errors.push("email address is not valid".to_string());
    }

    let taken: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ?1 AND id != ?2")
            .bind(&req.email)
            .bind(user.id)
            .fetch_optional(&state.pool)
            .await?;

    if taken.is_some() {
        errors.push("email is already registered".to_string());
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    sqlx::query("UPDATE users SET email = ?1, full_name = ?2 WHERE id = ?3")
        .bind(&req.email)
        .bind(&req.full_name)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    fetch_user(&state.pool, user.id).await.map(Json)
}
