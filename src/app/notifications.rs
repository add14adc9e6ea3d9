use anyhow::{anyhow, Result};
use serde_json::Value;
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::notification::{
    FeedItem, Notification, NotificationPush, NotificationType, TargetType,
};
use crate::infra::db::Db;

/// Recipient selection for a new notification.
#[derive(Debug, Clone)]
pub enum Target {
    /// Exactly one account.
    Account(Uuid),
    /// Every account that is an active client at creation time, plus the
    /// synthetic fallback for accounts that appear later.
    AllClients,
}

impl Target {
    fn target_type(&self) -> TargetType {
        match self {
            Target::Account(_) => TargetType::Specific,
            Target::AllClients => TargetType::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub type_id: i32,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub reference_id: Option<Uuid>,
    pub reference_table: Option<String>,
    pub target: Target,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreatedNotification {
    pub notification: Notification,
    pub type_name: String,
    /// Accounts that received an unread delivery row (creator excluded).
    pub recipients: Vec<Uuid>,
}

impl CreatedNotification {
    pub fn push_payload(&self) -> NotificationPush {
        NotificationPush {
            notification_id: self.notification.id,
            type_name: self.type_name.clone(),
            title: self.notification.title.clone(),
            message: self.notification.message.clone(),
            data: self.notification.data.clone(),
            reference_id: self.notification.reference_id,
            reference_table: self.notification.reference_table.clone(),
            created_by: self.notification.created_by,
            created_at: self.notification.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct UnreadCount {
    /// Unread, non-deleted delivery rows.
    pub explicit: i64,
    /// Broadcast notifications in the retention window with no row at all.
    pub synthetic: i64,
}

impl UnreadCount {
    pub fn total(&self) -> i64 {
        self.explicit + self.synthetic
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: Db,
    retention_days: i64,
}

impl NotificationService {
    pub fn new(db: Db, retention_days: i64) -> Self {
        Self { db, retention_days }
    }

    fn retention_cutoff(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() - Duration::days(self.retention_days)
    }

    /// Create the durable notification record and materialize its delivery
    /// rows in one transaction. Returns `None` when `type_id` is not in the
    /// lookup catalog; no other validation is applied.
    ///
    /// For broadcast targets the creator's own row is inserted already read,
    /// and the creator is excluded from the returned recipient set. An empty
    /// recipient set is not an error.
    pub async fn create(&self, new: NewNotification) -> Result<Option<CreatedNotification>> {
        let type_name: Option<String> =
            sqlx::query_scalar("SELECT type_name FROM notification_types WHERE id = $1")
                .bind(new.type_id)
                .fetch_optional(self.db.pool())
                .await?;
        let Some(type_name) = type_name else {
            return Ok(None);
        };

        let target_type = new.target.target_type();
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(
            "INSERT INTO notifications \
             (type_id, title, message, data, reference_id, reference_table, target_type, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, created_at",
        )
        .bind(new.type_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.data)
        .bind(new.reference_id)
        .bind(&new.reference_table)
        .bind(target_type.as_str())
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let notification_id: Uuid = row.get("id");
        let created_at: OffsetDateTime = row.get("created_at");

        let recipients = match new.target {
            Target::Account(recipient) => {
                sqlx::query(
                    "INSERT INTO notification_recipients (account_id, notification_id) \
                     VALUES ($1, $2)",
                )
                .bind(recipient)
                .bind(notification_id)
                .execute(&mut *tx)
                .await?;

                vec![recipient]
            }
            Target::AllClients => {
                let eligible: Vec<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM accounts \
                     WHERE role = 'client' AND NOT is_deleted \
                       AND ($1::uuid IS NULL OR id <> $1)",
                )
                .bind(new.created_by)
                .fetch_all(&mut *tx)
                .await?;

                if !eligible.is_empty() {
                    sqlx::query(
                        "INSERT INTO notification_recipients (account_id, notification_id) \
                         SELECT account_id, $2 FROM unnest($1::uuid[]) AS t(account_id)",
                    )
                    .bind(&eligible)
                    .bind(notification_id)
                    .execute(&mut *tx)
                    .await?;
                }

                if let Some(creator) = new.created_by {
                    sqlx::query(
                        "INSERT INTO notification_recipients \
                         (account_id, notification_id, is_read, read_at) \
                         VALUES ($1, $2, TRUE, now()) \
                         ON CONFLICT (account_id, notification_id) DO NOTHING",
                    )
                    .bind(creator)
                    .bind(notification_id)
                    .execute(&mut *tx)
                    .await?;
                }

                eligible
            }
        };

        tx.commit().await?;

        let notification = Notification {
            id: notification_id,
            type_id: new.type_id,
            title: new.title,
            message: new.message,
            data: new.data,
            reference_id: new.reference_id,
            reference_table: new.reference_table,
            target_type,
            created_by: new.created_by,
            created_at,
        };

        Ok(Some(CreatedNotification {
            notification,
            type_name,
            recipients,
        }))
    }

    /// Merged feed for an account: explicit non-deleted delivery rows plus
    /// synthetic entries for in-window broadcasts with no row. The merge is
    /// done in application code so the precedence rule (an existing row,
    /// whatever its state, beats the synthetic view) stays independent of
    /// the storage dialect. Sorted by creation time descending, 1-based
    /// pagination.
    pub async fn list(&self, account_id: Uuid, page: i64, page_size: i64) -> Result<FeedPage> {
        let explicit_rows = sqlx::query(
            "SELECT n.id, n.type_id, nt.type_name, n.title, n.message, n.data, \
                    n.reference_id, n.reference_table, n.target_type, n.created_by, n.created_at, \
                    r.is_read, r.read_at, r.delivered_at \
             FROM notification_recipients r \
             JOIN notifications n ON n.id = r.notification_id \
             JOIN notification_types nt ON nt.id = n.type_id \
             WHERE r.account_id = $1 AND NOT r.is_deleted",
        )
        .bind(account_id)
        .fetch_all(self.db.pool())
        .await?;

        let synthetic_rows = sqlx::query(
            "SELECT n.id, n.type_id, nt.type_name, n.title, n.message, n.data, \
                    n.reference_id, n.reference_table, n.target_type, n.created_by, n.created_at \
             FROM notifications n \
             JOIN notification_types nt ON nt.id = n.type_id \
             WHERE n.target_type = 'all' AND n.created_at > $2 \
               AND NOT EXISTS (\
                   SELECT 1 FROM notification_recipients r \
                   WHERE r.notification_id = n.id AND r.account_id = $1)",
        )
        .bind(account_id)
        .bind(self.retention_cutoff())
        .fetch_all(self.db.pool())
        .await?;

        let mut items = Vec::with_capacity(explicit_rows.len() + synthetic_rows.len());
        for row in explicit_rows {
            let is_read: bool = row.get("is_read");
            let read_at: Option<OffsetDateTime> = row.get("read_at");
            let delivered_at: OffsetDateTime = row.get("delivered_at");
            items.push(feed_item_from_row(&row, is_read, read_at, Some(delivered_at))?);
        }
        for row in synthetic_rows {
            items.push(feed_item_from_row(&row, false, None, None)?);
        }

        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = items.len() as i64;
        let start = ((page - 1) * page_size) as usize;
        let items = items
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();

        Ok(FeedPage { items, total })
    }

    /// Counts exactly what `list` would return as unread at the same
    /// instant: explicit unread rows plus synthetic candidates, never both
    /// for the same notification.
    pub async fn unread_count(&self, account_id: Uuid) -> Result<UnreadCount> {
        let explicit: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_recipients \
             WHERE account_id = $1 AND NOT is_read AND NOT is_deleted",
        )
        .bind(account_id)
        .fetch_one(self.db.pool())
        .await?;

        let synthetic: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications n \
             WHERE n.target_type = 'all' AND n.created_at > $2 \
               AND NOT EXISTS (\
                   SELECT 1 FROM notification_recipients r \
                   WHERE r.notification_id = n.id AND r.account_id = $1)",
        )
        .bind(account_id)
        .bind(self.retention_cutoff())
        .fetch_one(self.db.pool())
        .await?;

        Ok(UnreadCount {
            explicit,
            synthetic,
        })
    }

    /// Idempotent. When no delivery row exists, a broadcast notification is
    /// materialized directly in the read state; a missing targeted record is
    /// a harmless no-op. Returns whether any row was touched.
    pub async fn mark_read(&self, account_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_recipients \
             SET is_read = TRUE, read_at = now() \
             WHERE account_id = $1 AND notification_id = $2",
        )
        .bind(account_id)
        .bind(notification_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let inserted = sqlx::query(
            "INSERT INTO notification_recipients \
             (account_id, notification_id, is_read, read_at) \
             SELECT $1, id, TRUE, now() FROM notifications \
             WHERE id = $2 AND target_type = 'all' \
             ON CONFLICT (account_id, notification_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(notification_id)
        .execute(self.db.pool())
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    /// Flip every unread row to read and, in the same transaction,
    /// materialize read rows for every synthetic entry currently visible.
    pub async fn mark_all_read(&self, account_id: Uuid) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            "UPDATE notification_recipients \
             SET is_read = TRUE, read_at = now() \
             WHERE account_id = $1 AND NOT is_read",
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO notification_recipients \
             (account_id, notification_id, is_read, read_at) \
             SELECT $1, n.id, TRUE, now() FROM notifications n \
             WHERE n.target_type = 'all' AND n.created_at > $2 \
               AND NOT EXISTS (\
                   SELECT 1 FROM notification_recipients r \
                   WHERE r.notification_id = n.id AND r.account_id = $1) \
             ON CONFLICT (account_id, notification_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(self.retention_cutoff())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Soft-delete the calling account's own delivery row. The shared
    /// notification and other accounts' rows are untouched. A still-synthetic
    /// broadcast entry gets a deleted row materialized so it drops out of the
    /// account's feed; a missing targeted record is a no-op.
    pub async fn delete(&self, account_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification_recipients \
             SET is_deleted = TRUE \
             WHERE account_id = $1 AND notification_id = $2",
        )
        .bind(account_id)
        .bind(notification_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let inserted = sqlx::query(
            "INSERT INTO notification_recipients \
             (account_id, notification_id, is_deleted) \
             SELECT $1, id, TRUE FROM notifications \
             WHERE id = $2 AND target_type = 'all' \
             ON CONFLICT (account_id, notification_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(notification_id)
        .execute(self.db.pool())
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    pub async fn list_types(&self) -> Result<Vec<NotificationType>> {
        let rows = sqlx::query("SELECT id, type_name FROM notification_types ORDER BY id")
            .fetch_all(self.db.pool())
            .await?;

        let mut types = Vec::with_capacity(rows.len());
        for row in rows {
            types.push(NotificationType {
                id: row.get("id"),
                type_name: row.get("type_name"),
            });
        }

        Ok(types)
    }
}

fn feed_item_from_row(
    row: &sqlx::postgres::PgRow,
    is_read: bool,
    read_at: Option<OffsetDateTime>,
    delivered_at: Option<OffsetDateTime>,
) -> Result<FeedItem> {
    let target_type: String = row.get("target_type");
    let target_type = TargetType::from_db(&target_type)
        .ok_or_else(|| anyhow!("unknown target_type in store: {}", target_type))?;

    Ok(FeedItem {
        id: row.get("id"),
        type_id: row.get("type_id"),
        type_name: row.get("type_name"),
        title: row.get("title"),
        message: row.get("message"),
        data: row.get("data"),
        reference_id: row.get("reference_id"),
        reference_table: row.get("reference_table"),
        target_type,
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        is_read,
        read_at,
        delivered_at,
    })
}
