// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport seam between the proxy core and the message bus.
//!
//! The core never talks to a socket. It sends [`Message`]s to named module
//! destinations and, for the apply path, synchronously awaits the correlated
//! reply with a bounded timeout. The hub that actually moves bytes between
//! edge and cloud implements [`MessageLayer`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// Errors that can occur while moving messages through the bus.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived within the deadline.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The destination exists but its channel is gone.
    #[error("transport channel closed")]
    ChannelClosed,

    /// Nothing is registered under the destination name.
    #[error("no route to destination: {0}")]
    NoRoute(String),

    /// A reply arrived whose parent id matches no pending request.
    #[error("no pending request for reply to {0}")]
    UnknownCorrelation(String),
}

/// Send/await primitives the proxy core is written against.
#[async_trait]
pub trait MessageLayer: Send + Sync {
    /// Fire-and-forget delivery to a module destination.
    async fn send(&self, destination: &str, message: Message) -> Result<(), TransportError>;

    /// Deliver a request and await the reply correlated by the message id,
    /// bounded by `timeout`.
    async fn send_sync(
        &self,
        destination: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    /// Deliver a reply back to whoever is awaiting `message.parent_id`.
    async fn response(&self, message: Message) -> Result<(), TransportError>;
}
