// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The application wire form: lifecycle status, structured backend error and
//! the serialized request/response document.
//!
//! An application is one proxied resource request. Its identity-forming
//! fields (node, key, verb, option, body, subresource, token) never change;
//! status, reason, error and response body are filled in as it moves through
//! the lifecycle. The fingerprint over the identity fields is the
//! deduplication key on the edge side.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::message::b64;
use crate::resource::{ResourceKey, Verb};
use crate::ProtocolError;

/// Lifecycle state of an application.
///
/// `PreApplying` and `InApplying` are set on the edge; `InProcessing`,
/// `Approved` and `Rejected` on the cloud; `Failed` marks a transport-level
/// failure and `Completed` an application all callers have released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[default]
    PreApplying,
    InApplying,
    InProcessing,
    Approved,
    Rejected,
    Failed,
    Completed,
}

impl ApplicationStatus {
    /// Whether this state ends an apply cycle.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected | ApplicationStatus::Failed
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationStatus::PreApplying => "PreApplying",
            ApplicationStatus::InApplying => "InApplying",
            ApplicationStatus::InProcessing => "InProcessing",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Rejected => "Rejected",
            ApplicationStatus::Failed => "Failed",
            ApplicationStatus::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// Structured rejection from the resource backend.
///
/// Carried verbatim back to the original caller so a proxied request fails
/// with the same error shape a direct backend call would have produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    /// HTTP-style status code.
    pub code: u16,
    /// Machine-readable reason (e.g. `Forbidden`, `NotFound`).
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
}

impl StatusError {
    pub fn new(code: u16, reason: &str, message: &str) -> Self {
        Self {
            code,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn forbidden(message: &str) -> Self {
        Self::new(403, "Forbidden", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(404, "NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(400, "BadRequest", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(500, "InternalError", message)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.code, self.message)
    }
}

impl std::error::Error for StatusError {}

/// Serialize a payload into opaque content bytes.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// The serialized application travelling as message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDocument {
    /// Content fingerprint; filled by the edge side before sending.
    #[serde(default)]
    pub id: String,
    pub key: ResourceKey,
    pub verb: Verb,
    pub node_name: String,
    pub status: ApplicationStatus,
    /// Why the application is in its status; set on Failed/Rejected.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Serialized per-verb options.
    #[serde(default, with = "b64")]
    pub option: Vec<u8>,
    /// Serialized request body.
    #[serde(default, with = "b64")]
    pub req_body: Vec<u8>,
    /// Serialized response body.
    #[serde(default, with = "b64")]
    pub resp_body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subresource: Option<String>,
    /// Structured backend rejection, when the backend produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StatusError>,
    /// Caller's bearer credential, carried so the cloud side can authorize
    /// with the caller's own identity.
    #[serde(default)]
    pub token: String,
}

impl ApplicationDocument {
    /// Create a fresh document in `PreApplying` with the given identity.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: ResourceKey,
        verb: Verb,
        node_name: &str,
        subresource: Option<&str>,
        option: Vec<u8>,
        req_body: Vec<u8>,
        token: &str,
    ) -> Self {
        Self {
            id: String::new(),
            key,
            verb,
            node_name: node_name.to_string(),
            status: ApplicationStatus::PreApplying,
            reason: String::new(),
            option,
            req_body,
            resp_body: Vec::new(),
            subresource: subresource.map(str::to_string),
            error: None,
            token: token.to_string(),
        }
    }

    /// Deterministic fingerprint over the identity-forming fields.
    ///
    /// Two documents built from identical (node, key, verb, option, body,
    /// subresource, token) tuples hash to the same value regardless of their
    /// lifecycle state.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.node_name.as_bytes());
        hasher.update(self.key.to_string().as_bytes());
        hasher.update(self.verb.as_str().as_bytes());
        hasher.update(&self.option);
        hasher.update(&self.req_body);
        hasher.update(self.subresource.as_deref().unwrap_or_default().as_bytes());
        hasher.update(self.token.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn payload_to<T: DeserializeOwned>(payload: &[u8], what: &str) -> Result<T, ProtocolError> {
        if payload.is_empty() {
            return Err(ProtocolError::Decode(format!("{what} payload is empty")));
        }
        serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::Decode(format!("failed to parse {what}: {e}")))
    }

    /// Decode the option bytes into the shape the verb expects.
    pub fn option_to<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Self::payload_to(&self.option, "option")
    }

    /// Decode the request body.
    pub fn req_body_to<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Self::payload_to(&self.req_body, "request body")
    }

    /// Decode the response body.
    pub fn resp_body_to<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Self::payload_to(&self.resp_body, "response body")
    }
}
