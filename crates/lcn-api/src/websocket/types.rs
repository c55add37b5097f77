//! WebSocket message types
//!
//! Defines all incoming and outgoing WebSocket message types.

use lcn_devices::Platform;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message types the dispatcher knows about
pub const KNOWN_TYPES: &[&str] = &[
    "auth",
    "ping",
    "lcn/hosts",
    "lcn/devices",
    "lcn/entities",
    "lcn/device/scan",
    "lcn/device/delete",
    "lcn/entity/delete",
    "lcn/entity/add",
];

// =============================================================================
// Incoming Messages
// =============================================================================

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Auth {
        access_token: Option<String>,
    },
    Ping {
        id: u64,
    },
    #[serde(rename = "lcn/hosts")]
    Hosts {
        id: u64,
    },
    #[serde(rename = "lcn/devices")]
    Devices {
        id: u64,
        host: String,
    },
    #[serde(rename = "lcn/entities")]
    Entities {
        id: u64,
        host: String,
        unique_device_id: String,
    },
    #[serde(rename = "lcn/device/scan")]
    DeviceScan {
        id: u64,
        host: String,
    },
    #[serde(rename = "lcn/device/delete")]
    DeviceDelete {
        id: u64,
        host: String,
        unique_id: String,
    },
    #[serde(rename = "lcn/entity/delete")]
    EntityDelete {
        id: u64,
        host: String,
        unique_id: String,
    },
    #[serde(rename = "lcn/entity/add")]
    EntityAdd {
        id: u64,
        host: String,
        unique_device_id: String,
        platform: Platform,
        resource: String,
        name: String,
        #[serde(default)]
        platform_data: Map<String, Value>,
    },
}

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Outgoing WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    AuthRequired(AuthRequiredMessage),
    AuthOk(AuthOkMessage),
    AuthInvalid(AuthInvalidMessage),
    Pong(PongMessage),
    Result(ResultMessage),
}

#[derive(Debug, Serialize)]
pub struct AuthRequiredMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub ha_version: String,
}

#[derive(Debug, Serialize)]
pub struct AuthOkMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub ha_version: String,
}

#[derive(Debug, Serialize)]
pub struct AuthInvalidMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PongMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResultMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub success: bool,
    /// Always present on success, `null` included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ResultMessage {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            msg_type: "result",
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            msg_type: "result",
            success: false,
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Error codes sent in failed results
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const UNKNOWN_COMMAND: &str = "unknown_command";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const HOME_ASSISTANT_ERROR: &str = "home_assistant_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const ID_REUSE: &str = "id_reuse";
}
