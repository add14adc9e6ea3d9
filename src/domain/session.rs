use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// One live client connection. An account may hold several at once
/// (multiple devices or tabs), each with its own row.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSession {
    pub id: Uuid,
    pub account_id: Uuid,
    pub is_active: bool,
    pub user_agent: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
}
