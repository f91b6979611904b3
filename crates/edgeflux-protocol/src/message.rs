// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message envelope and routing for the edge/cloud bus.
//!
//! Every message carries a fresh UUID; a response answers a request by
//! carrying the request's id in `parent_id`. The transport must preserve both
//! ends of that correlation (see [`crate::transport::MessageLayer`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Route source set by the edge-side proxy agent.
pub const SOURCE_METAPROXY: &str = "metaproxy";
/// Route source set by the cloud-side application center.
pub const SOURCE_CENTER: &str = "applicationcenter";
/// Destination group handling application messages on the cloud side.
pub const GROUP_CENTER: &str = "proxycenter";
/// Resource group messages travel back through on the edge side.
pub const GROUP_RESOURCE: &str = "resource";
/// Resource type carried by application messages.
pub const RESOURCE_TYPE_APPLICATION: &str = "application";
/// Operation tag on application responses.
pub const OPERATION_APPLICATION_RESPONSE: &str = "applicationResponse";
/// Operation tag on application requests.
pub const OPERATION_APPLY: &str = "apply";
/// Placeholder for resource segments the application path does not use.
pub const SEGMENT_IGNORE: &str = "ignore";

/// Base64 (de)serialization for opaque byte payloads.
///
/// Raw `Vec<u8>` would serialize as a JSON number array; every opaque payload
/// on the wire goes through this instead.
pub(crate) mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Where a message comes from and what it asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Module that emitted the message.
    #[serde(default)]
    pub source: String,
    /// Module group the message is addressed to.
    #[serde(default)]
    pub group: String,
    /// Resource path the message concerns (e.g. `node/<name>/.../application`).
    #[serde(default)]
    pub resource: String,
    /// Operation performed on the resource.
    #[serde(default)]
    pub operation: String,
}

/// One unit of traffic on the edge/cloud bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: String,
    /// Id of the request this message answers; empty on requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    /// Routing header.
    #[serde(default)]
    pub route: Route,
    /// Serialized payload, opaque to the transport.
    #[serde(default, with = "b64")]
    pub content: Vec<u8>,
}

impl Message {
    /// Create a new request message with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: String::new(),
            route: Route::default(),
            content: Vec::new(),
        }
    }

    /// Create a response message correlated to `parent_id`.
    pub fn reply_to(parent_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            ..Self::new()
        }
    }

    /// Set the source and destination group of the route.
    pub fn set_route(mut self, source: &str, group: &str) -> Self {
        self.route.source = source.to_string();
        self.route.group = group.to_string();
        self
    }

    /// Set the resource path and operation of the route.
    pub fn set_resource_operation(mut self, resource: &str, operation: &str) -> Self {
        self.route.resource = resource.to_string();
        self.route.operation = operation.to_string();
        self
    }

    /// Serialize `body` into the message content.
    pub fn fill_body<T: Serialize>(mut self, body: &T) -> Result<Self, ProtocolError> {
        self.content = serde_json::to_vec(body).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(self)
    }

    /// Decode the message content into `T`.
    pub fn get_content<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        if self.content.is_empty() {
            return Err(ProtocolError::Decode("message content is empty".to_string()));
        }
        serde_json::from_slice(&self.content).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Whether this message answers another one.
    pub fn is_reply(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource path for application traffic addressed to one edge node.
pub fn application_resource(node_name: &str) -> String {
    format!("node/{node_name}/{SEGMENT_IGNORE}/{RESOURCE_TYPE_APPLICATION}/{SEGMENT_IGNORE}")
}
