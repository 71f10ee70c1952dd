use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{auth::CurrentUser, error::AppError, models::chat::ChatMessage, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(chats_overview))
        .route("/unread", get(unread_badge))
        .route("/:uid/messages", get(room_messages).post(room_send))
}

#[derive(Serialize)]
struct ChatOverviewEntry {
    uid: String,
    name: String,
    avatar: String,
    unread: usize,
}

async fn chats_overview(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<ChatOverviewEntry>>, AppError> {
    let user = current.require_user()?;
    let mut entries = Vec::new();
    for friend in state.friends.friends_of(&user.uid).await? {
        let unread = state.chat.unread_in_room(&user.uid, &friend.uid).await?;
        entries.push(ChatOverviewEntry {
            uid: friend.uid,
            name: friend.name,
            avatar: friend.avatar,
            unread,
        });
    }
    Ok(Json(entries))
}

#[derive(Serialize)]
struct UnreadBadge {
    count: usize,
}

async fn unread_badge(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<UnreadBadge>, AppError> {
    let user = current.require_user()?;
    Ok(Json(UnreadBadge {
        count: state.chat.unread_count(&user.uid).await?,
    }))
}

/// Opening a room also marks its messages as read, like the client did on
/// every snapshot.
async fn room_messages(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(friend_uid): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let user = current.require_user()?;
    state.chat.mark_read(&user.uid, &friend_uid).await?;
    Ok(Json(state.chat.messages(&user.uid, &friend_uid).await?))
}

#[derive(Deserialize)]
struct MessageForm {
    text: String,
}

async fn room_send(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(friend_uid): Path<String>,
    Json(form): Json<MessageForm>,
) -> Result<Json<ChatMessage>, AppError> {
    let user = current.require_user()?;
    let me = state.friends.profile(&user.uid).await?;
    if !me.is_friend(&friend_uid) {
        return Err(AppError::BadRequest(
            "you can only chat with your friends".into(),
        ));
    }
    Ok(Json(
        state
            .chat
            .send_message(&user.uid, &friend_uid, &form.text)
            .await?,
    ))
}
