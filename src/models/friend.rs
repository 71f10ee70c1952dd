use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::default_avatar;

pub const REQUEST_PENDING: &str = "pending";

/// A friend request document. Requests only ever exist in the pending
/// state: accepting or rejecting deletes the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    #[serde(default)]
    pub id: String,
    pub from_uid: String,
    pub from_username: String,
    #[serde(default = "default_avatar")]
    pub from_avatar: String,
    pub to_uid: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn new(from_uid: &str, from_username: &str, from_avatar: &str, to_uid: &str) -> Self {
        Self {
            id: String::new(),
            from_uid: from_uid.to_string(),
            from_username: from_username.to_string(),
            from_avatar: from_avatar.to_string(),
            to_uid: to_uid.to_string(),
            status: REQUEST_PENDING.to_string(),
            created_at: Utc::now(),
        }
    }
}
