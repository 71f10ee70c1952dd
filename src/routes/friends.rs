use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{friend::FriendRequest, user::PublicProfile},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(friends_list))
        .route("/search", get(user_search))
        .route("/requests", get(requests_list).post(request_send))
        .route("/requests/:id/accept", post(request_accept))
        .route("/requests/:id", delete(request_reject))
}

async fn friends_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<PublicProfile>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.friends.friends_of(&user.uid).await?))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn user_search(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<PublicProfile>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.friends.search_users(&user.uid, &params.q).await?))
}

async fn requests_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.friends.incoming_requests(&user.uid).await?))
}

#[derive(Deserialize)]
struct RequestForm {
    uid: String,
}

async fn request_send(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<RequestForm>,
) -> Result<Json<FriendRequest>, AppError> {
    let user = current.require_user()?;
    let me = state.friends.profile(&user.uid).await?;
    Ok(Json(state.friends.send_request(&me, &form.uid).await?))
}

async fn request_accept(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = current.require_user()?;
    state.friends.accept_request(&user.uid, &request_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn request_reject(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(request_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = current.require_user()?;
    state.friends.reject_request(&user.uid, &request_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
