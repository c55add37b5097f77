//! WebSocket message dispatch
//!
//! Routes incoming messages to the appropriate handler.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use super::connection::ActiveConnection;
use super::handlers::{self, send_result};
use super::types::{
    codes, IncomingMessage, OutgoingMessage, PongMessage, ResultMessage, KNOWN_TYPES,
};

/// Handle an incoming message
pub async fn handle_message(
    conn: &Arc<ActiveConnection>,
    text: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let json: Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid message format: {}", e))?;

    let msg_type = json.get("type").and_then(Value::as_str).map(str::to_string);
    let id = match json.get("id").and_then(Value::as_u64) {
        Some(id) => id,
        // Already authenticated
        None if msg_type.as_deref() == Some("auth") => return Ok(()),
        None => return Err(format!("Message without id: {}", text)),
    };

    if let Err(e) = conn.validate_id(id) {
        return send_result(tx, ResultMessage::error(id, codes::ID_REUSE, e)).await;
    }

    let msg_type = match msg_type {
        Some(msg_type) => msg_type,
        None => {
            let error =
                ResultMessage::error(id, codes::INVALID_FORMAT, "Message incorrectly formatted.");
            return send_result(tx, error).await;
        }
    };
    if !KNOWN_TYPES.contains(&msg_type.as_str()) {
        warn!("Unhandled WebSocket message type: {}", msg_type);
        let error = ResultMessage::error(id, codes::UNKNOWN_COMMAND, "Unknown command.");
        return send_result(tx, error).await;
    }

    let msg: IncomingMessage = match serde_json::from_value(json) {
        Ok(msg) => msg,
        Err(e) => {
            let error = ResultMessage::error(
                id,
                codes::INVALID_FORMAT,
                format!("Message format incorrect: {}", e),
            );
            return send_result(tx, error).await;
        }
    };

    if msg_type.starts_with("lcn/") && !conn.is_admin() {
        let error = ResultMessage::error(id, codes::UNAUTHORIZED, "Unauthorized");
        return send_result(tx, error).await;
    }

    match msg {
        IncomingMessage::Auth { .. } => Ok(()),
        IncomingMessage::Ping { id } => {
            let pong = OutgoingMessage::Pong(PongMessage {
                id,
                msg_type: "pong",
            });
            tx.send(pong).await.map_err(|e| e.to_string())
        }
        IncomingMessage::Hosts { id } => handlers::handle_hosts(conn, id, tx).await,
        IncomingMessage::Devices { id, host } => {
            handlers::handle_devices(conn, id, &host, tx).await
        }
        IncomingMessage::Entities {
            id,
            host,
            unique_device_id,
        } => handlers::handle_entities(conn, id, &host, &unique_device_id, tx).await,
        IncomingMessage::DeviceScan { id, host } => {
            handlers::handle_device_scan(conn, id, &host, tx).await
        }
        IncomingMessage::DeviceDelete {
            id,
            host,
            unique_id,
        } => handlers::handle_device_delete(conn, id, &host, &unique_id, tx).await,
        IncomingMessage::EntityDelete {
            id,
            host,
            unique_id,
        } => handlers::handle_entity_delete(conn, id, &host, &unique_id, tx).await,
        IncomingMessage::EntityAdd {
            id,
            host,
            unique_device_id,
            platform,
            resource,
            name,
            platform_data,
        } => {
            handlers::handle_entity_add(
                conn,
                id,
                &host,
                &unique_device_id,
                platform,
                &resource,
                &name,
                platform_data,
                tx,
            )
            .await
        }
    }
}
