use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;
pub mod services;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::account_routes())
        .merge(handlers::upload_routes())
}
