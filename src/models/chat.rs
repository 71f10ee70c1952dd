use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub room_id: String,
    pub text: String,
    pub sender_id: String,
    pub to_uid: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Room key for a pair of users. Sorting the uids makes the key identical
/// no matter which side opens the chat.
pub fn room_id(uid1: &str, uid2: &str) -> String {
    if uid1 < uid2 {
        format!("{uid1}_{uid2}")
    } else {
        format!("{uid2}_{uid1}")
    }
}
