use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::AppError,
    state::AppState,
    store::{DocumentStore, Query},
};

const USERS: &str = "users";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(my_profile).post(profile_update))
}

#[derive(Serialize)]
struct ProfileView {
    uid: String,
    name: String,
    username: String,
    email: String,
    avatar: String,
    bio: String,
    friend_count: usize,
}

async fn my_profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let user = current.require_user()?;
    let profile = state.friends.profile(&user.uid).await?;
    Ok(Json(ProfileView {
        uid: profile.uid.clone(),
        name: profile.name.clone(),
        username: profile.username.clone(),
        email: profile.email.clone(),
        avatar: profile.avatar.clone(),
        bio: profile.bio.clone(),
        friend_count: profile.friends.len(),
    }))
}

#[derive(Deserialize)]
struct ProfileForm {
    name: String,
    username: String,
    #[serde(default)]
    bio: String,
}

async fn profile_update(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ProfileForm>,
) -> Result<Json<ProfileView>, AppError> {
    let user = current.require_user()?;
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let username = form.username.trim().to_lowercase().replace('@', "");
    if username.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }
    let at_name = format!("@{username}");

    // The handle must stay unique across everyone else.
    let taken = state
        .store
        .query(&Query::collection(USERS).filter("username", at_name.clone()))
        .await?;
    if taken.iter().any(|doc| doc.id != user.uid) {
        return Err(AppError::BadRequest("that username is already taken".into()));
    }

    state
        .store
        .update(
            USERS,
            &user.uid,
            json!({
                "name": name,
                "username": at_name,
                "bio": form.bio.trim(),
            }),
        )
        .await?;

    let profile = state.friends.profile(&user.uid).await?;
    Ok(Json(ProfileView {
        uid: profile.uid.clone(),
        name: profile.name.clone(),
        username: profile.username.clone(),
        email: profile.email.clone(),
        avatar: profile.avatar.clone(),
        bio: profile.bio.clone(),
        friend_count: profile.friends.len(),
    }))
}
