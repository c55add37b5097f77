//! WebSocket command handlers
//!
//! One handler per `lcn/*` command. Hub errors are mapped onto result
//! error codes here.

use std::sync::Arc;

use lcn_devices::{EntityRecord, Platform, StoreError};
use lcn_hub::{HubError, HubResult};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::ActiveConnection;
use super::types::{codes, OutgoingMessage, ResultMessage};

// =============================================================================
// Replies
// =============================================================================

pub async fn send_result(
    tx: &mpsc::Sender<OutgoingMessage>,
    result: ResultMessage,
) -> Result<(), String> {
    tx.send(OutgoingMessage::Result(result))
        .await
        .map_err(|e| e.to_string())
}

/// Error code reported for a hub failure
pub fn error_code(error: &HubError) -> &'static str {
    match error {
        HubError::HostNotFound(_)
        | HubError::Store(StoreError::DeviceNotFound(_))
        | HubError::Store(StoreError::EntityNotFound(_)) => codes::NOT_FOUND,
        HubError::Store(StoreError::UnknownDevice(_))
        | HubError::Store(StoreError::DuplicateEntity { .. }) => codes::INVALID_REQUEST,
        _ => codes::HOME_ASSISTANT_ERROR,
    }
}

async fn reply<T: Serialize>(
    tx: &mpsc::Sender<OutgoingMessage>,
    id: u64,
    result: HubResult<T>,
) -> Result<(), String> {
    let message = match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => ResultMessage::success(id, value),
            Err(e) => ResultMessage::error(id, codes::HOME_ASSISTANT_ERROR, e.to_string()),
        },
        Err(e) => {
            debug!("Command {} failed: {}", id, e);
            ResultMessage::error(id, error_code(&e), e.to_string())
        }
    };
    send_result(tx, message).await
}

// =============================================================================
// Hosts and devices
// =============================================================================

/// Handle lcn/hosts command
pub async fn handle_hosts(
    conn: &Arc<ActiveConnection>,
    id: u64,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let hosts = conn.state.hub.list_hosts();
    reply(tx, id, Ok(hosts)).await
}

/// Handle lcn/devices command
pub async fn handle_devices(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let devices = conn.state.hub.devices(host).await;
    reply(tx, id, devices).await
}

/// Handle lcn/entities command
pub async fn handle_entities(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    unique_device_id: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let entities = conn.state.hub.entities(host, unique_device_id).await;
    reply(tx, id, entities).await
}

/// Handle lcn/device/scan command
pub async fn handle_device_scan(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let result = conn.state.hub.scan_devices(host).await.map(|report| {
        for failure in &report.failures {
            warn!("Scan of {} skipped {}: {}", host, failure.address, failure.error);
        }
        report.devices
    });
    reply(tx, id, result).await
}

/// Handle lcn/device/delete command
pub async fn handle_device_delete(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    unique_id: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let result = conn.state.hub.delete_device(host, unique_id).await;
    reply(tx, id, result).await
}

// =============================================================================
// Entities
// =============================================================================

/// Handle lcn/entity/delete command
pub async fn handle_entity_delete(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    unique_id: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let result = conn.state.hub.delete_entity(host, unique_id).await;
    reply(tx, id, result).await
}

/// Handle lcn/entity/add command
#[allow(clippy::too_many_arguments)]
pub async fn handle_entity_add(
    conn: &Arc<ActiveConnection>,
    id: u64,
    host: &str,
    unique_device_id: &str,
    platform: Platform,
    resource: &str,
    name: &str,
    platform_data: Map<String, Value>,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let record = EntityRecord::new(unique_device_id, platform, resource, name)
        .with_platform_data(platform_data);
    let result = conn.state.hub.add_entity(host, record).await;
    reply(tx, id, result).await
}
