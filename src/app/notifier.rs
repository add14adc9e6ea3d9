use anyhow::Result;
use uuid::Uuid;

use crate::app::dispatch::Dispatcher;
use crate::app::notifications::{NewNotification, NotificationService};

/// Entry point for domain event producers (appointment workflow, content
/// publishing, forum). Persists the notification, materializes recipient
/// rows, then pushes to whoever is online, in that order: the durable
/// record exists before any push is attempted and stays authoritative if
/// the push path fails.
#[derive(Clone)]
pub struct Notifier {
    notifications: NotificationService,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn new(notifications: NotificationService, dispatcher: Dispatcher) -> Self {
        Self {
            notifications,
            dispatcher,
        }
    }

    /// Returns the new notification id, or `None` when the type is not in
    /// the catalog.
    pub async fn notify(&self, new: NewNotification) -> Result<Option<Uuid>> {
        let Some(created) = self.notifications.create(new).await? else {
            return Ok(None);
        };

        let push = created.push_payload();
        self.dispatcher.dispatch(&push, &created.recipients).await;

        Ok(Some(created.notification.id))
    }
}
