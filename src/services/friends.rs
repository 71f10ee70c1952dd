//! Friend requests: the same pending-then-resolved shape as trip
//! invitations, except both resolutions delete the request document and
//! acceptance links the two profiles symmetrically.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{
        friend::{FriendRequest, REQUEST_PENDING},
        user::{PublicProfile, UserProfile},
    },
    services::retry::{retry_write, RetryConfig},
    store::{encode, DocumentStore, Query, Snapshot},
};

const USERS: &str = "users";
const FRIEND_REQUESTS: &str = "friend_requests";

/// The search works over a bounded page of profiles, filtered in memory.
const SEARCH_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct FriendService {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl FriendService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn profile(&self, uid: &str) -> Result<UserProfile, AppError> {
        self.store
            .get(USERS, uid)
            .await?
            .ok_or(AppError::NotFound)?
            .decode()
    }

    pub async fn search_users(&self, me: &str, term: &str) -> Result<Vec<PublicProfile>, AppError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .store
            .query(&Query::collection(USERS).limit(SEARCH_PAGE_SIZE))
            .await?;
        let profiles: Vec<UserProfile> = Snapshot { docs }.decode_all();
        Ok(profiles
            .iter()
            .filter(|p| p.uid != me)
            .filter(|p| {
                p.username.to_lowercase().contains(&term) || p.name.to_lowercase().contains(&term)
            })
            .map(PublicProfile::from)
            .collect())
    }

    pub async fn send_request(
        &self,
        from: &UserProfile,
        to_uid: &str,
    ) -> Result<FriendRequest, AppError> {
        if from.uid == to_uid {
            return Err(AppError::BadRequest("you cannot befriend yourself".into()));
        }
        let target = self.profile(to_uid).await?;
        if from.is_friend(to_uid) {
            return Err(AppError::BadRequest(format!(
                "{} is already your friend",
                target.name
            )));
        }

        let mut request = FriendRequest::new(&from.uid, &from.username, &from.avatar, to_uid);
        let mut fields = encode(&request)?;
        if let Some(obj) = fields.as_object_mut() {
            obj.remove("id");
        }
        let doc = retry_write(&self.retry, || {
            self.store.add(FRIEND_REQUESTS, fields.clone())
        })
        .await?;
        request.id = doc.id;
        info!(from = %from.uid, to = %to_uid, "friend request sent");
        Ok(request)
    }

    pub async fn incoming_requests(&self, uid: &str) -> Result<Vec<FriendRequest>, AppError> {
        let query = Query::collection(FRIEND_REQUESTS)
            .filter("to_uid", uid)
            .filter("status", REQUEST_PENDING);
        let docs = self.store.query(&query).await?;
        Ok(Snapshot { docs }.decode_all())
    }

    pub async fn accept_request(&self, me: &str, request_id: &str) -> Result<(), AppError> {
        let doc = self
            .store
            .get(FRIEND_REQUESTS, request_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let request: FriendRequest = doc.decode()?;
        if request.to_uid != me {
            return Err(AppError::NotAuthorized);
        }

        // Both profiles are linked before the request disappears, so a
        // crash in between leaves the request retryable, not half-applied.
        retry_write(&self.retry, || {
            self.store
                .array_union(USERS, me, "friends", vec![json!(request.from_uid)])
        })
        .await?;
        retry_write(&self.retry, || {
            self.store
                .array_union(USERS, &request.from_uid, "friends", vec![json!(me)])
        })
        .await?;
        retry_write(&self.retry, || self.store.delete(FRIEND_REQUESTS, request_id)).await?;

        info!(me = %me, friend = %request.from_uid, "friend request accepted");
        Ok(())
    }

    pub async fn reject_request(&self, me: &str, request_id: &str) -> Result<(), AppError> {
        let Some(doc) = self.store.get(FRIEND_REQUESTS, request_id).await? else {
            return Ok(()); // already resolved elsewhere
        };
        let request: FriendRequest = doc.decode()?;
        if request.to_uid != me {
            return Err(AppError::NotAuthorized);
        }
        retry_write(&self.retry, || self.store.delete(FRIEND_REQUESTS, request_id)).await?;
        info!(me = %me, from = %request.from_uid, "friend request rejected");
        Ok(())
    }

    pub async fn friends_of(&self, uid: &str) -> Result<Vec<PublicProfile>, AppError> {
        let profile = self.profile(uid).await?;
        let mut friends = Vec::new();
        for friend_uid in &profile.friends {
            match self.store.get(USERS, friend_uid).await? {
                Some(doc) => match doc.decode::<UserProfile>() {
                    Ok(friend) => friends.push(PublicProfile::from(&friend)),
                    Err(err) => warn!(uid = %friend_uid, "skipping unreadable profile: {err}"),
                },
                None => warn!(uid = %friend_uid, "friend profile vanished"),
            }
        }
        Ok(friends)
    }
}
