// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Edgeflux Protocol - shared wire vocabulary between edge and cloud.
//!
//! This crate defines everything that crosses the edge/cloud boundary of the
//! edgeflux proxying layer:
//!
//! - the message envelope with parent-id correlation ([`Message`], [`Route`])
//! - the transport seam consumed by both sides ([`MessageLayer`]) plus an
//!   in-process implementation ([`MemoryMessageLayer`]) used by tests and
//!   embedded single-process deployments
//! - resource addressing ([`GroupVersionResource`], [`ResourceKey`], [`Verb`])
//! - per-verb request options and the patch descriptor
//! - schema-less resource bodies ([`DynamicObject`], [`DynamicList`])
//! - the serialized application ([`ApplicationDocument`]) with its lifecycle
//!   status, structured backend error and content fingerprint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    edgeflux-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Application wire form: status, options, fingerprint        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: Message + Route + parent-id correlation          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport seam: MessageLayer (send / send_sync / response) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The real transport (websocket/QUIC hub between edge and cloud) lives
//! outside this workspace; anything implementing [`MessageLayer`] plugs in.

pub mod application;
pub mod memory;
pub mod message;
pub mod object;
pub mod options;
pub mod resource;
pub mod transport;

use thiserror::Error;

/// Errors produced while encoding or decoding protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A resource key string does not have the canonical five-segment form.
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    /// A verb string is outside the supported set.
    #[error("unsupported application verb: {0}")]
    InvalidVerb(String),

    /// A value could not be serialized into message content.
    #[error("failed to encode content: {0}")]
    Encode(String),

    /// Message content or an opaque payload did not match the target shape.
    #[error("failed to decode content: {0}")]
    Decode(String),
}

pub use application::{to_bytes, ApplicationDocument, ApplicationStatus, StatusError};
pub use memory::MemoryMessageLayer;
pub use message::{
    application_resource, Message, Route, GROUP_CENTER, GROUP_RESOURCE,
    OPERATION_APPLICATION_RESPONSE, OPERATION_APPLY, RESOURCE_TYPE_APPLICATION, SEGMENT_IGNORE,
    SOURCE_CENTER, SOURCE_METAPROXY,
};
pub use object::{DynamicList, DynamicObject};
pub use options::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, PatchOptions, PatchRequest, PatchType,
    Selector, UpdateOptions,
};
pub use resource::{GroupVersionResource, ResourceKey, Verb};
pub use transport::{MessageLayer, TransportError};
