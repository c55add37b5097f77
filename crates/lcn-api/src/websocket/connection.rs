//! WebSocket connection handling
//!
//! Manages WebSocket connections, authentication, and message routing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::Access;
use crate::AppState;

use super::dispatch::handle_message;
use super::types::{
    AuthInvalidMessage, AuthOkMessage, AuthRequiredMessage, IncomingMessage, OutgoingMessage,
};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Connection State
// =============================================================================

/// Per-connection state
pub struct ActiveConnection {
    pub state: AppState,
    /// Last message ID received
    last_id: AtomicU64,
    pub access: Access,
}

impl ActiveConnection {
    pub fn new(state: AppState, access: Access) -> Self {
        Self {
            state,
            last_id: AtomicU64::new(0),
            access,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.access.is_admin()
    }

    /// Validate that the message ID is increasing
    pub fn validate_id(&self, id: u64) -> Result<(), &'static str> {
        let last = self.last_id.fetch_max(id, Ordering::SeqCst);
        if id <= last {
            return Err("Identifier values have to increase.");
        }
        Ok(())
    }
}

// =============================================================================
// WebSocket Handler
// =============================================================================

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let version = env!("CARGO_PKG_VERSION").to_string();

    let auth_required = OutgoingMessage::AuthRequired(AuthRequiredMessage {
        msg_type: "auth_required",
        ha_version: version.clone(),
    });
    if let Err(e) = send_message(&mut sender, &auth_required).await {
        error!("Failed to send auth_required: {}", e);
        return;
    }

    let auth_result = tokio::time::timeout(AUTH_TIMEOUT, wait_for_auth(&mut receiver)).await;
    let token = match auth_result {
        Ok(Ok(token)) => token,
        Ok(Err(reason)) => {
            reject(&mut sender, "Invalid access token").await;
            warn!("WebSocket client authentication failed: {}", reason);
            return;
        }
        Err(_) => {
            reject(&mut sender, "Authentication timeout").await;
            warn!("WebSocket client authentication timeout");
            return;
        }
    };

    let access = match state.auth.authenticate(&token) {
        Some(access) => access,
        None => {
            reject(&mut sender, "Invalid access token").await;
            warn!("WebSocket client sent an unknown token");
            return;
        }
    };

    let auth_ok = OutgoingMessage::AuthOk(AuthOkMessage {
        msg_type: "auth_ok",
        ha_version: version,
    });
    if let Err(e) = send_message(&mut sender, &auth_ok).await {
        error!("Failed to send auth_ok: {}", e);
        return;
    }
    info!("WebSocket client authenticated ({:?})", access);

    let conn = Arc::new(ActiveConnection::new(state, access));
    let (tx, mut rx) = mpsc::channel::<OutgoingMessage>(64);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_message(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("WS RECV: {}", text);
                if let Err(e) = handle_message(&conn, &text, &tx).await {
                    error!("Error handling message: {}", e);
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    info!("WebSocket connection closed");
}

// =============================================================================
// Authentication
// =============================================================================

/// Wait for the `auth` message and return its token
async fn wait_for_auth(receiver: &mut SplitStream<WebSocket>) -> Result<String, String> {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<IncomingMessage>(&text) {
                    Ok(IncomingMessage::Auth {
                        access_token: Some(token),
                    }) => Ok(token),
                    Ok(IncomingMessage::Auth { access_token: None }) => {
                        Err("missing access_token".to_string())
                    }
                    _ => Err("expected auth message".to_string()),
                };
            }
            Ok(Message::Close(_)) => return Err("connection closed".to_string()),
            Err(e) => return Err(format!("WebSocket error: {}", e)),
            _ => {}
        }
    }
    Err("connection closed".to_string())
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, message: &str) {
    let auth_invalid = OutgoingMessage::AuthInvalid(AuthInvalidMessage {
        msg_type: "auth_invalid",
        message: message.to_string(),
    });
    let _ = send_message(sender, &auth_invalid).await;
}

/// Send a message to the WebSocket
pub async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &OutgoingMessage,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    debug!("Sending: {}", json);
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_state;

    #[tokio::test]
    async fn test_validate_id_must_increase() {
        let (_dir, state, _) = create_test_state().await;
        let conn = ActiveConnection::new(state, Access::Admin);

        assert!(conn.validate_id(1).is_ok());
        assert!(conn.validate_id(5).is_ok());
        assert!(conn.validate_id(5).is_err());
        assert!(conn.validate_id(3).is_err());
        assert!(conn.validate_id(6).is_ok());
    }
}
