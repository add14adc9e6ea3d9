use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::app::dispatch::Dispatcher;
use crate::app::notifications::{NewNotification, NotificationService, Target};
use crate::app::notifier::Notifier;
use crate::app::presence::PresenceRegistry;
use crate::domain::notification::{FeedItem, NotificationType, TargetType};
use crate::http::{AdminToken, AppError, AuthAccount};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

fn notification_service(state: &AppState) -> NotificationService {
    NotificationService::new(state.db.clone(), state.retention_days)
}

fn dispatcher(state: &AppState) -> Dispatcher {
    Dispatcher::new(PresenceRegistry::new(state.db.clone()), state.hub.clone())
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub items: Vec<FeedItem>,
    pub pagination: Pagination,
}

pub async fn list_notifications(
    auth: AuthAccount,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<NotificationListResponse>, AppError> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::bad_request("page must be at least 1"));
    }
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AppError::bad_request("page_size must be between 1 and 100"));
    }

    let service = notification_service(&state);
    let feed = service
        .list(auth.account_id, page, page_size)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, account_id = %auth.account_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    let pages = (feed.total + page_size - 1) / page_size;

    Ok(Json(NotificationListResponse {
        items: feed.items,
        pagination: Pagination {
            page,
            page_size,
            total: feed.total,
            pages,
        },
    }))
}

#[derive(Serialize)]
pub struct UnreadBreakdown {
    pub explicit: i64,
    pub synthetic: i64,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
    pub breakdown: UnreadBreakdown,
}

pub async fn unread_count(
    auth: AuthAccount,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let service = notification_service(&state);
    let count = service.unread_count(auth.account_id).await.map_err(|err| {
        tracing::error!(error = ?err, account_id = %auth.account_id, "failed to count unread notifications");
        AppError::internal("failed to count unread notifications")
    })?;

    Ok(Json(UnreadCountResponse {
        unread: count.total(),
        breakdown: UnreadBreakdown {
            explicit: count.explicit,
            synthetic: count.synthetic,
        },
    }))
}

pub async fn mark_notification_read(
    auth: AuthAccount,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = notification_service(&state);
    service.mark_read(auth.account_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, notification_id = %id, account_id = %auth.account_id, "failed to mark notification read");
        AppError::internal("failed to mark notification read")
    })?;

    dispatcher(&state).notify_read(auth.account_id, id).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_notifications_read(
    auth: AuthAccount,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = notification_service(&state);
    service.mark_all_read(auth.account_id).await.map_err(|err| {
        tracing::error!(error = ?err, account_id = %auth.account_id, "failed to mark all notifications read");
        AppError::internal("failed to mark all notifications read")
    })?;

    dispatcher(&state).notify_all_read(auth.account_id).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_notification(
    auth: AuthAccount,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = notification_service(&state);
    service.delete(auth.account_id, id).await.map_err(|err| {
        tracing::error!(error = ?err, notification_id = %id, account_id = %auth.account_id, "failed to delete notification");
        AppError::internal("failed to delete notification")
    })?;

    dispatcher(&state).notify_deleted(auth.account_id, id).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_notification_types(
    _auth: AuthAccount,
    State(state): State<AppState>,
) -> Result<Json<Vec<NotificationType>>, AppError> {
    let service = notification_service(&state);
    let types = service.list_types().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list notification types");
        AppError::internal("failed to list notification types")
    })?;

    Ok(Json(types))
}

#[derive(Deserialize)]
pub struct CreateNotificationRequest {
    pub type_id: i32,
    pub title: String,
    pub message: String,
    pub data: Option<Value>,
    pub reference_id: Option<Uuid>,
    pub reference_table: Option<String>,
    pub target_type: TargetType,
    pub recipient_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[derive(Serialize)]
pub struct CreateNotificationResponse {
    pub id: Uuid,
}

pub async fn create_notification(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<CreateNotificationResponse>), AppError> {
    if payload.title.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(AppError::bad_request("title and message are required"));
    }

    let target = match payload.target_type {
        TargetType::Specific => {
            let recipient = payload.recipient_id.ok_or_else(|| {
                AppError::bad_request("recipient_id is required for specific targeting")
            })?;
            Target::Account(recipient)
        }
        TargetType::All => Target::AllClients,
    };

    let new = NewNotification {
        type_id: payload.type_id,
        title: payload.title,
        message: payload.message,
        data: payload.data.unwrap_or_else(|| Value::Object(Default::default())),
        reference_id: payload.reference_id,
        reference_table: payload.reference_table,
        target,
        created_by: payload.created_by,
    };

    let notifier = Notifier::new(notification_service(&state), dispatcher(&state));
    let id = notifier.notify(new).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to create notification");
        AppError::internal("failed to create notification")
    })?;

    match id {
        Some(id) => Ok((StatusCode::CREATED, Json(CreateNotificationResponse { id }))),
        None => Err(AppError::bad_request("unknown notification type")),
    }
}

#[derive(Deserialize)]
pub struct PruneSessionsRequest {
    pub idle_seconds: Option<i64>,
}

#[derive(Serialize)]
pub struct PruneSessionsResponse {
    pub pruned: u64,
}

pub async fn prune_sessions(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<PruneSessionsRequest>,
) -> Result<Json<PruneSessionsResponse>, AppError> {
    let idle_seconds = payload.idle_seconds.unwrap_or(300);
    if idle_seconds < 1 {
        return Err(AppError::bad_request("idle_seconds must be at least 1"));
    }

    let cutoff = OffsetDateTime::now_utc() - Duration::seconds(idle_seconds);
    let registry = PresenceRegistry::new(state.db.clone());
    let pruned = registry.prune_stale(cutoff).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to prune sessions");
        AppError::internal("failed to prune sessions")
    })?;

    Ok(Json(PruneSessionsResponse { pruned }))
}
