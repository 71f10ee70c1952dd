pub mod chats;
pub mod friends;
pub mod profile;
pub mod public;
pub mod trips;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .nest("/friends", friends::router())
        .nest("/chats", chats::router())
        .nest("/profile", profile::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
