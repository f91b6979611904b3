// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Edgeflux proxy core - edge-to-cloud API request proxying.
//!
//! Edge nodes never talk to the control plane's resource store directly.
//! They issue *applications* - tracked, deduplicated representations of one
//! get/list/watch/create/update/patch/delete request - which the edge-side
//! [`Agent`] sends over the message bus to the cloud-side [`Center`], where
//! they are authorized, executed against the real resource backend and the
//! result routed back to the originating node.
//!
//! # Data flow
//!
//! ```text
//! caller ──▶ Agent::generate (build/dedup) ──▶ Agent::apply (send, block)
//!                                                   │ transport
//!                                                   ▼
//!                                      Center::process (authorize/execute)
//!                                                   │ correlated reply
//!                                                   ▼
//!                              Agent unblocks caller with the merged result
//! ```
//!
//! Both sides run a periodic sweeper reclaiming idle applications.
//!
//! The collaborators the center executes against - the dynamic resource
//! client, the access-review authorizer, the watch-listener registry and the
//! response filter - are consumed through the traits in [`backend`]; the
//! message bus through [`edgeflux_protocol::MessageLayer`].

pub mod agent;
pub mod application;
pub mod backend;
pub mod center;
pub mod config;
pub mod error;

pub use agent::{Agent, RequestContext, ResourceInfo};
pub use application::Application;
pub use backend::{
    AccessDecision, AccessReview, Authorizer, DynamicClientFactory, DynamicResourceClient,
    ListenerRegistry, PassthroughFilter, ResponseFilter, SelectorListener,
};
pub use center::{Center, ResponsePayload};
pub use config::{AgentConfig, CenterConfig, ConfigError};
pub use error::{ProxyError, Result};
