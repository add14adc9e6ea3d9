use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;
mod ws;

pub use auth::{AdminToken, AuthAccount};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::notifications())
        .merge(routes::realtime())
        .merge(routes::admin())
        .with_state(state)
}
