use uuid::Uuid;

use crate::app::presence::PresenceRegistry;
use crate::domain::notification::NotificationPush;
use crate::infra::realtime::{RealtimeHub, ServerEvent};

/// Pushes notification events to live sessions. Strictly best-effort: the
/// durable store has already committed by the time anything is dispatched,
/// so every failure here is logged and swallowed. An offline or unreachable
/// client discovers the notification through listing instead.
#[derive(Clone)]
pub struct Dispatcher {
    registry: PresenceRegistry,
    hub: RealtimeHub,
}

impl Dispatcher {
    pub fn new(registry: PresenceRegistry, hub: RealtimeHub) -> Self {
        Self { registry, hub }
    }

    /// Push `new_notification` to every active session of every recipient.
    /// No dedup across a recipient's sessions; each live session gets its
    /// own push. A dead session is skipped, the rest still receive theirs.
    pub async fn dispatch(&self, push: &NotificationPush, recipients: &[Uuid]) {
        if recipients.is_empty() {
            return;
        }

        let sessions = match self.registry.active_sessions(recipients).await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    notification_id = %push.notification_id,
                    "presence lookup failed, skipping push"
                );
                return;
            }
        };

        tracing::debug!(
            notification_id = %push.notification_id,
            recipients = recipients.len(),
            sessions = sessions.len(),
            "dispatching notification"
        );

        for session in sessions {
            if let Err(err) = self
                .hub
                .push(session.id, ServerEvent::NewNotification(push.clone()))
                .await
            {
                tracing::warn!(
                    error = ?err,
                    session_id = %session.id,
                    account_id = %session.account_id,
                    "push failed, client will catch up via listing"
                );
            }
        }
    }

    /// Sync a read state change to the account's own open sessions.
    pub async fn notify_read(&self, account_id: Uuid, notification_id: Uuid) {
        self.notify_account(account_id, ServerEvent::NotificationRead { notification_id })
            .await;
    }

    pub async fn notify_all_read(&self, account_id: Uuid) {
        self.notify_account(account_id, ServerEvent::AllRead).await;
    }

    pub async fn notify_deleted(&self, account_id: Uuid, notification_id: Uuid) {
        self.notify_account(
            account_id,
            ServerEvent::NotificationDeleted { notification_id },
        )
        .await;
    }

    async fn notify_account(&self, account_id: Uuid, event: ServerEvent) {
        let sessions = match self.registry.active_sessions(&[account_id]).await {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::warn!(error = ?err, account_id = %account_id, "presence lookup failed");
                return;
            }
        };

        for session in sessions {
            if let Err(err) = self.hub.push(session.id, event.clone()).await {
                tracing::warn!(
                    error = ?err,
                    session_id = %session.id,
                    account_id = %account_id,
                    "event push failed"
                );
            }
        }
    }
}
