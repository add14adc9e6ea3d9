use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Who a notification is addressed to: exactly one account, or the
/// open-ended set of all eligible client accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Specific,
    All,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Specific => "specific",
            TargetType::All => "all",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "specific" => Some(TargetType::Specific),
            "all" => Some(TargetType::All),
            _ => None,
        }
    }
}

/// Immutable after creation. Per-recipient state lives in
/// `notification_recipients`, never here.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub type_id: i32,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub reference_id: Option<Uuid>,
    pub reference_table: Option<String>,
    pub target_type: TargetType,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationType {
    pub id: i32,
    pub type_name: String,
}

/// One entry of an account's merged notification feed.
///
/// `delivered_at` is `None` for synthetic entries: broadcast notifications
/// inside the retention window that have no stored recipient row for this
/// account yet.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub id: Uuid,
    pub type_id: i32,
    pub type_name: String,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub reference_id: Option<Uuid>,
    pub reference_table: Option<String>,
    pub target_type: TargetType,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,
}

/// The payload pushed to live sessions when a notification is created.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPush {
    pub notification_id: Uuid,
    pub type_name: String,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub reference_id: Option<Uuid>,
    pub reference_table: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
