use anyhow::Result;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::session::LiveSession;
use crate::infra::db::Db;

/// Durable registry of live client connections, keyed per session id so
/// concurrent join/leave from different devices of one account never
/// contend. Rows survive process restarts; a crash without a clean
/// disconnect leaves a stale active row, cleared only by `prune_stale`.
#[derive(Clone)]
pub struct PresenceRegistry {
    db: Db,
}

impl PresenceRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Idempotent upsert: re-joining with the same session id reactivates
    /// the row and refreshes its metadata.
    pub async fn join(
        &self,
        account_id: Uuid,
        session_id: Uuid,
        user_agent: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO live_sessions (id, account_id, user_agent) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE \
             SET is_active = TRUE, \
                 last_seen_at = now(), \
                 user_agent = EXCLUDED.user_agent",
        )
        .bind(session_id)
        .bind(account_id)
        .bind(user_agent)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Safe no-op when the session was never joined or already left
    /// (duplicate disconnect signals are normal).
    pub async fn leave(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE live_sessions SET is_active = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Heartbeat: refresh `last_seen_at` for an active session.
    pub async fn touch(&self, session_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE live_sessions SET last_seen_at = now() WHERE id = $1 AND is_active",
        )
        .bind(session_id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// All active sessions for any of the given accounts. Used for fan-out;
    /// one account can legitimately map to many sessions.
    pub async fn active_sessions(&self, account_ids: &[Uuid]) -> Result<Vec<LiveSession>> {
        let rows = sqlx::query(
            "SELECT id, account_id, is_active, user_agent, connected_at, last_seen_at \
             FROM live_sessions \
             WHERE account_id = ANY($1) AND is_active",
        )
        .bind(account_ids)
        .fetch_all(self.db.pool())
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(LiveSession {
                id: row.get("id"),
                account_id: row.get("account_id"),
                is_active: row.get("is_active"),
                user_agent: row.get("user_agent"),
                connected_at: row.get("connected_at"),
                last_seen_at: row.get("last_seen_at"),
            });
        }

        Ok(sessions)
    }

    /// Deactivate sessions not seen since `cutoff`. Never runs automatically;
    /// exposed as an explicit maintenance operation. Returns the number of
    /// rows cleared.
    pub async fn prune_stale(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE live_sessions SET is_active = FALSE \
             WHERE is_active AND last_seen_at < $1",
        )
        .bind(cutoff)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
