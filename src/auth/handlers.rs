use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest, TokenResponse},
        extractors::AuthUser,
        password::{hash_password_blocking, verify_password_blocking, DUMMY_HASH},
        repo::NewUser,
    },
    error::AppError,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s/]+@[^@\s/]+\.[^@\s/]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }

    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // Skip the hash for an obvious duplicate; the store still decides races.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let hashed_password = hash_password_blocking(payload.password).await?;
    let full_name = payload
        .full_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let user = state
        .users
        .create(NewUser {
            email,
            hashed_password,
            full_name,
        })
        .await
        .inspect_err(|e| warn!(error = %e, "create user failed"))?;

    let issued = state.keys.issue(&user.email)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(Json(TokenResponse::bearer(issued.token)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        // Same argon2 work as a wrong password.
        verify_password_blocking(payload.password, DUMMY_HASH.to_string()).await?;
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let ok = verify_password_blocking(payload.password, user.hashed_password.clone()).await?;
    if !ok {
        warn!(%email, user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    if !user.is_active {
        warn!(%email, user_id = user.id, "login inactive user");
        return Err(AppError::InvalidCredentials);
    }

    let issued = state.keys.issue(&user.email)?;
    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(Json(TokenResponse::bearer(issued.token)))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_email(&user.email)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(PublicUser::from(user)))
}
