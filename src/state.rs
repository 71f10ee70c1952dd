use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::AppConfig,
    services::{
        chat::ChatService, friends::FriendService, membership::MembershipService,
        notify::MatrixNotifier, retry::RetryConfig, trips::TripService,
    },
    store::DocumentStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub membership: MembershipService,
    pub trips: TripService,
    pub friends: FriendService,
    pub chat: ChatService,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>, notifier: MatrixNotifier) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);
        let retry = RetryConfig::from_config(&config);
        Self {
            membership: MembershipService::new(store.clone(), notifier, retry),
            trips: TripService::new(store.clone(), retry),
            friends: FriendService::new(store.clone(), retry),
            chat: ChatService::new(store.clone(), retry),
            config,
            store,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
