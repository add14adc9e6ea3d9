use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::app::presence::PresenceRegistry;
use crate::http::AuthAccount;
use crate::AppState;

/// Joins the caller's logical channel: one durable session row plus an
/// in-process hub attachment, both torn down when the socket closes.
pub async fn connect(
    auth: AuthAccount,
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| session(socket, state, auth.account_id, user_agent))
}

async fn session(
    socket: WebSocket,
    state: AppState,
    account_id: Uuid,
    user_agent: Option<String>,
) {
    let session_id = Uuid::new_v4();
    let registry = PresenceRegistry::new(state.db.clone());

    if let Err(err) = registry
        .join(account_id, session_id, user_agent.as_deref())
        .await
    {
        tracing::error!(error = ?err, account_id = %account_id, "failed to register session");
        return;
    }
    tracing::debug!(session_id = %session_id, account_id = %account_id, "session joined");

    let mut events = state.hub.attach(session_id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::error!(error = ?err, session_id = %session_id, "failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        if let Err(err) = registry.touch(session_id).await {
                            tracing::warn!(error = ?err, session_id = %session_id, "heartbeat update failed");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = ?err, session_id = %session_id, "socket error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.detach(session_id).await;
    if let Err(err) = registry.leave(session_id).await {
        tracing::warn!(error = ?err, session_id = %session_id, "failed to deactivate session");
    }
    tracing::debug!(session_id = %session_id, account_id = %account_id, "session left");
}
