use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::{
    error::AppError,
    models::chat::{room_id, ChatMessage},
    services::retry::{retry_write, RetryConfig},
    store::{encode, DocumentStore, Query, Snapshot},
};

const CHATS: &str = "chats";
const MESSAGES: &str = "messages";

/// Only the newest page of a room is loaded; older history stays in the
/// store until someone scrolls for it.
const ROOM_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl ChatService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn send_message(
        &self,
        sender_uid: &str,
        recipient_uid: &str,
        text: &str,
    ) -> Result<ChatMessage, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("message text cannot be empty".into()));
        }

        let room = room_id(sender_uid, recipient_uid);
        let mut message = ChatMessage {
            id: String::new(),
            room_id: room.clone(),
            text: text.to_string(),
            sender_id: sender_uid.to_string(),
            to_uid: recipient_uid.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        let mut fields = encode(&message)?;
        if let Some(obj) = fields.as_object_mut() {
            obj.remove("id");
        }
        let doc = retry_write(&self.retry, || self.store.add(MESSAGES, fields.clone())).await?;
        message.id = doc.id;

        // The room document only tracks participants and recency for the
        // overview; merge keeps whatever else may live there.
        let room_fields = json!({
            "users": [sender_uid, recipient_uid],
            "last_update": message.created_at,
        });
        retry_write(&self.retry, || {
            self.store.set(CHATS, &room, room_fields.clone())
        })
        .await?;

        info!(room = %room, from = %sender_uid, "message sent");
        Ok(message)
    }

    /// Newest page of the room, oldest first for display.
    pub async fn messages(&self, uid_a: &str, uid_b: &str) -> Result<Vec<ChatMessage>, AppError> {
        let room = room_id(uid_a, uid_b);
        let query = Query::collection(MESSAGES)
            .filter("room_id", room)
            .order_by_desc("created_at")
            .limit(ROOM_PAGE_SIZE);
        let docs = self.store.query(&query).await?;
        let mut messages: Vec<ChatMessage> = Snapshot { docs }.decode_all();
        messages.reverse();
        Ok(messages)
    }

    /// Marks everything addressed to `me` in this room as read. Runs on
    /// every room open, so it has to be repeat-safe.
    pub async fn mark_read(&self, me: &str, friend: &str) -> Result<(), AppError> {
        let room = room_id(me, friend);
        let query = Query::collection(MESSAGES)
            .filter("room_id", room)
            .filter("to_uid", me)
            .filter("read", false);
        for doc in self.store.query(&query).await? {
            retry_write(&self.retry, || {
                self.store.update(MESSAGES, &doc.id, json!({"read": true}))
            })
            .await?;
        }
        Ok(())
    }

    /// Total unread badge across every room.
    pub async fn unread_count(&self, uid: &str) -> Result<usize, AppError> {
        let query = Query::collection(MESSAGES)
            .filter("to_uid", uid)
            .filter("read", false);
        Ok(self.store.query(&query).await?.len())
    }

    pub async fn unread_in_room(&self, me: &str, friend: &str) -> Result<usize, AppError> {
        let room = room_id(me, friend);
        let query = Query::collection(MESSAGES)
            .filter("room_id", room)
            .filter("to_uid", me)
            .filter("read", false);
        Ok(self.store.query(&query).await?.len())
    }
}
