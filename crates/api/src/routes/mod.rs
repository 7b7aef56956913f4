pub mod channels;
pub mod health;
pub mod library;
pub mod videos;

use axum::Router;

use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(videos::router(state.clone()))
        .merge(library::router(state.clone()))
        .merge(channels::router(state))
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}
