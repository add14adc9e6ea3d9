use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::http::ws;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications", post(handlers::create_notification))
        .route(
            "/notifications/unread-count",
            get(handlers::unread_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route("/notifications/:id", delete(handlers::delete_notification))
        .route("/notification-types", get(handlers::list_notification_types))
}

pub fn realtime() -> Router<AppState> {
    Router::new().route("/ws", get(ws::connect))
}

pub fn admin() -> Router<AppState> {
    Router::new().route("/admin/sessions/prune", post(handlers::prune_sessions))
}
