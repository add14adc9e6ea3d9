use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::notification::NotificationPush;

/// Events published on an account's logical channel. The variant name is
/// the wire event name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewNotification(NotificationPush),
    NotificationRead { notification_id: Uuid },
    AllRead,
    NotificationDeleted { notification_id: Uuid },
}

/// In-process map of attached WebSocket connections, keyed by session id.
///
/// The durable presence registry decides who should receive a push; this hub
/// only knows which of those sessions are attached to *this* process. A push
/// to a session that is registered but not attached (stale registry row,
/// dropped socket) fails and is left to the caller to log.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    sessions: Arc<Mutex<HashMap<Uuid, UnboundedSender<ServerEvent>>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection and hand back its event stream.
    /// Re-attaching the same session id replaces the previous sender.
    pub async fn attach(&self, session_id: Uuid) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().await.insert(session_id, tx);
        rx
    }

    pub async fn detach(&self, session_id: Uuid) {
        self.sessions.lock().await.remove(&session_id);
    }

    pub async fn push(&self, session_id: Uuid, event: ServerEvent) -> Result<()> {
        let sessions = self.sessions.lock().await;
        let sender = sessions
            .get(&session_id)
            .ok_or_else(|| anyhow!("session {} is not attached", session_id))?;
        sender
            .send(event)
            .map_err(|_| anyhow!("session {} closed its event stream", session_id))?;
        Ok(())
    }
}
