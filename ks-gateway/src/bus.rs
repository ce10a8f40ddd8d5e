//! Message bus abstraction and the payloads that cross it
//!
//! The gateway publishes device events and line snapshots, and answers
//! commands by publishing a response on a topic named after the request
//! id. The bus itself stays behind a trait so tests can record publishes
//! without a broker.

use async_trait::async_trait;
use ks_core::{KsError, KsResult};
use ks_register::ParamMap;
use serde::{Deserialize, Serialize};

/// Outbound side of the message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> KsResult<()>;
}

/// Connection lifecycle event for a concentrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    #[serde(rename = "ONLINE")]
    Online,
    #[serde(rename = "OFFLINE")]
    Offline,
}

/// Body published on the event topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event: DeviceEvent,
}

/// Read a register from a line node
///
/// `identifiers` follows the wire shape of the command; the dispatcher
/// accepts exactly one entry per request.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPropertyRequest {
    pub request_id: String,
    /// Concentrator serial number, selects the session
    pub sn: String,
    /// Line node serial number, addresses the frames
    pub node: String,
    pub identifiers: Vec<String>,
}

/// Write a register on a line node
#[derive(Debug, Clone, Deserialize)]
pub struct SetPropertyRequest {
    pub request_id: String,
    pub sn: String,
    pub node: String,
    pub identifiers: Vec<String>,
    pub params: ParamMap,
}

/// Invoke a named service on a concentrator or line node
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeServiceRequest {
    pub request_id: String,
    pub sn: String,
    /// Line node serial number; services aimed at the concentrator
    /// itself leave it empty
    #[serde(default)]
    pub node: String,
    pub identifier: String,
    #[serde(default)]
    pub params: ParamMap,
}

/// Command outcome, published on the topic named by the request id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    pub data: ParamMap,
}

impl CommandResponse {
    pub fn ok(request_id: String, data: ParamMap) -> Self {
        Self {
            request_id,
            success: true,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn error(request_id: String, err: &KsError) -> Self {
        Self {
            request_id,
            success: false,
            message: err.to_string(),
            data: ParamMap::new(),
        }
    }
}

/// Topic carrying ONLINE/OFFLINE events for a concentrator
pub fn event_topic(project: &str, sn: &str) -> String {
    format!("{}/{}/event", project, sn)
}

/// Topic carrying the polled snapshot of one line
pub fn property_topic(project: &str, sn: &str, model: &str, line: &str) -> String {
    format!("{}/{}/{}/{}/property", project, sn, model, line)
}

/// Topic carrying fault notifications for one line
pub fn fault_topic(project: &str, sn: &str, model: &str, line: &str) -> String {
    format!("{}/{}/{}/{}/fault", project, sn, model, line)
}
