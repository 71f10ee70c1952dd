use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::PrivateCookieJar;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{trip::default_avatar, user::UserProfile},
    state::AppState,
    store::{encode, DocumentStore, Query},
};

pub const SESSION_COOKIE: &str = "tripshare_session";

const USERS: &str = "users";

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub username: String,
    pub name: String,
    pub avatar: String,
}

impl From<&UserProfile> for AuthenticatedUser {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            username: profile.username.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar = match PrivateCookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(err) => match err {},
        };
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };
        let Some(doc) = state.store.get(USERS, cookie.value()).await? else {
            // Stale cookie for a deleted account; treat as signed out.
            return Ok(Self(None));
        };
        let profile: UserProfile = doc.decode()?;
        Ok(Self(Some(AuthenticatedUser::from(&profile))))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub fn apply_session_cookie(jar: PrivateCookieJar, uid: &str) -> PrivateCookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, uid.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    jar.remove(cookie)
}

/// Creates the account and its profile document. Usernames are stored
/// lowercased with a leading `@` and must be unique, as must emails.
pub async fn register_user(
    state: &AppState,
    username: &str,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let clean = username.trim().to_lowercase().replace('@', "");
    if clean.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::BadRequest("email address is invalid".into()));
    }
    if password.len() < 6 {
        return Err(AppError::BadRequest(
            "password must be at least 6 characters".into(),
        ));
    }

    let at_name = format!("@{clean}");
    let username_taken = state
        .store
        .query(&Query::collection(USERS).filter("username", at_name.clone()).limit(1))
        .await?;
    if !username_taken.is_empty() {
        return Err(AppError::BadRequest("that username is already taken".into()));
    }
    let email_taken = state
        .store
        .query(&Query::collection(USERS).filter("email", email.clone()).limit(1))
        .await?;
    if !email_taken.is_empty() {
        return Err(AppError::BadRequest(
            "that email is already registered".into(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))?
        .to_string();

    let profile = UserProfile {
        uid: Uuid::new_v4().to_string(),
        name: clean,
        username: at_name,
        email,
        password_hash,
        avatar: default_avatar(),
        bio: "Hey! I'm new to TripShare 🌍".into(),
        friends: Vec::new(),
        matrix_user_id: None,
        created_at: Utc::now(),
    };
    state
        .store
        .set(USERS, &profile.uid, encode(&profile)?)
        .await?;
    info!(uid = %profile.uid, username = %profile.username, "user registered");
    Ok(AuthenticatedUser::from(&profile))
}

/// Login by email or username. The same error comes back for an unknown
/// identifier and a wrong password.
pub async fn authenticate_user(
    state: &AppState,
    identifier: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let identifier = identifier.trim().to_lowercase();
    if identifier.is_empty() {
        return Err(AppError::BadRequest("identifier is required".into()));
    }

    let mut docs = state
        .store
        .query(&Query::collection(USERS).filter("email", identifier.clone()).limit(1))
        .await?;
    if docs.is_empty() {
        let at_name = if identifier.starts_with('@') {
            identifier.clone()
        } else {
            format!("@{identifier}")
        };
        docs = state
            .store
            .query(&Query::collection(USERS).filter("username", at_name).limit(1))
            .await?;
    }
    let Some(doc) = docs.into_iter().next() else {
        return Err(AppError::Unauthorized);
    };
    let profile: UserProfile = doc.decode()?;

    let parsed = PasswordHash::new(&profile.password_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored password hash is invalid: {err}")))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(AppError::Unauthorized);
    }

    Ok(AuthenticatedUser::from(&profile))
}
