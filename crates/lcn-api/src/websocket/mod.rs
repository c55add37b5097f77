//! LCN WebSocket API
//!
//! Frames follow the Home Assistant websocket protocol: `auth_required`,
//! `auth`, then `{id, type, ...}` commands answered by `result` messages.
//!
//! This module is organized into:
//! - `types` - Message type definitions (IncomingMessage, OutgoingMessage, etc.)
//! - `connection` - Connection handling and authentication
//! - `dispatch` - Message routing to handlers
//! - `handlers` - Individual command handlers

mod connection;
mod dispatch;
mod handlers;
mod types;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use crate::AppState;

pub use connection::ActiveConnection;
pub use dispatch::handle_message;
pub use handlers::error_code;
pub use types::{
    codes, AuthInvalidMessage, AuthOkMessage, AuthRequiredMessage, ErrorInfo, IncomingMessage,
    OutgoingMessage, PongMessage, ResultMessage,
};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_devices::Platform;

    #[test]
    fn test_parse_auth_message() {
        let json = r#"{"type": "auth", "access_token": "test_token"}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match msg {
            IncomingMessage::Auth { access_token } => {
                assert_eq!(access_token, Some("test_token".to_string()));
            }
            _ => panic!("Expected Auth message"),
        }
    }

    #[test]
    fn test_parse_entities() {
        let json = r#"{"type": "lcn/entities", "id": 3, "host": "pchk", "unique_device_id": "abc"}"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match msg {
            IncomingMessage::Entities {
                id,
                host,
                unique_device_id,
            } => {
                assert_eq!(id, 3);
                assert_eq!(host, "pchk");
                assert_eq!(unique_device_id, "abc");
            }
            _ => panic!("Expected Entities message"),
        }
    }

    #[test]
    fn test_parse_entity_add_defaults() {
        let json = r#"{
            "type": "lcn/entity/add",
            "id": 4,
            "host": "pchk",
            "unique_device_id": "abc",
            "platform": "binary_sensor",
            "resource": "binsensor1",
            "name": "Window"
        }"#;
        let msg: IncomingMessage = serde_json::from_str(json).unwrap();
        match msg {
            IncomingMessage::EntityAdd {
                platform,
                platform_data,
                ..
            } => {
                assert_eq!(platform, Platform::BinarySensor);
                assert!(platform_data.is_empty());
            }
            _ => panic!("Expected EntityAdd message"),
        }
    }

    #[test]
    fn test_reject_unknown_platform() {
        let json = r#"{
            "type": "lcn/entity/add",
            "id": 4,
            "host": "pchk",
            "unique_device_id": "abc",
            "platform": "vacuum",
            "resource": "r",
            "name": "n"
        }"#;
        assert!(serde_json::from_str::<IncomingMessage>(json).is_err());
    }

    #[test]
    fn test_serialize_error_result() {
        let msg = OutgoingMessage::Result(ResultMessage::error(7, codes::NOT_FOUND, "gone"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "type": "result",
                "success": false,
                "error": {"code": "not_found", "message": "gone"}
            })
        );
    }

    #[test]
    fn test_serialize_null_result() {
        let msg = OutgoingMessage::Result(ResultMessage::success(8, serde_json::Value::Null));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"result\":null"));
    }
}
