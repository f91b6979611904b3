// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the proxy core.

use edgeflux_protocol::{ProtocolError, StatusError, TransportError};
use thiserror::Error;

/// Result type using ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while generating, applying or processing an
/// application.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request context carries no routable resource-request metadata.
    #[error("request context carries no resource request info")]
    NotResourceRequest,

    /// The request context carries no caller token.
    #[error("request context carries no authorization token")]
    MissingToken,

    /// The carried token is not a well-formed bearer credential.
    #[error("invalid bearer token format")]
    InvalidToken,

    /// The application was never registered with the agent's live table.
    #[error("application {0} has not been registered to the agent")]
    NotRegistered(String),

    /// Authorization was denied for the caller's token.
    #[error("authorization denied: {0}")]
    Unauthorized(String),

    /// The resource backend rejected the request; the structured error is
    /// carried back to the caller unchanged.
    #[error(transparent)]
    Backend(#[from] StatusError),

    /// The apply cycle ended in `Failed`; `apply` may be retried.
    #[error("application failed: {0}")]
    ApplyFailed(String),

    /// The key names a collection where a single resource is required.
    #[error("resource key {0} carries no name for verb {1}")]
    MissingName(String, String),

    /// Listener registration for a watch application failed.
    #[error("failed to register listener: {0}")]
    Listener(String),

    /// Transport failure or timeout on the apply path.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Undecodable wire content or payload shape mismatch.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
