use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::PrivateCookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{self, AuthenticatedUser, CurrentUser},
    error::AppError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(session_info))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Serialize)]
struct SessionUser {
    uid: String,
    username: String,
    name: String,
    avatar: String,
}

impl From<&AuthenticatedUser> for SessionUser {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            uid: user.uid.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Serialize)]
struct SessionResponse {
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<SessionUser>,
}

async fn session_info(current: CurrentUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        logged_in: current.0.is_some(),
        user: current.0.as_ref().map(SessionUser::from),
    })
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(form): Json<RegisterForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::register_user(&state, &form.username, &form.email, &form.password).await?;
    let jar = auth::apply_session_cookie(jar, &user.uid);
    Ok((jar, Json(SessionUser::from(&user))))
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::authenticate_user(&state, &form.identifier, &form.password).await?;
    let jar = auth::apply_session_cookie(jar, &user.uid);
    Ok((jar, Json(SessionUser::from(&user))))
}

async fn logout(jar: PrivateCookieJar) -> impl IntoResponse {
    let jar = auth::clear_session_cookie(jar);
    (
        jar,
        Json(SessionResponse {
            logged_in: false,
            user: None,
        }),
    )
}
