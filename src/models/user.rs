use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::{default_avatar, Member, MemberStatus};

/// Profile document in the `users` collection, keyed by the user's uid.
/// The uid is duplicated inside the document on purpose so the record is
/// self-describing when read outside a query context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn as_member(&self) -> Member {
        Member {
            id: self.uid.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            status: MemberStatus::Accepted,
        }
    }

    pub fn is_friend(&self, uid: &str) -> bool {
        self.friends.iter().any(|f| f == uid)
    }
}

/// The slice of a profile other users get to see.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub uid: String,
    pub name: String,
    pub username: String,
    pub avatar: String,
    pub bio: String,
}

impl From<&UserProfile> for PublicProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            name: profile.name.clone(),
            username: profile.username.clone(),
            avatar: profile.avatar.clone(),
            bio: profile.bio.clone(),
        }
    }
}
