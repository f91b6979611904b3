// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Seams between the application center and its resource backend.
//!
//! The center never talks to a concrete API server; it works through these
//! traits so the backend can be a real cluster client in production and an
//! in-memory fake in tests. All backend failures surface as [`StatusError`]
//! so they travel back to the caller in the document's error slot.

use std::sync::Arc;

use async_trait::async_trait;

use edgeflux_protocol::{
    CreateOptions, DeleteOptions, DynamicList, DynamicObject, GetOptions, GroupVersionResource,
    ListOptions, PatchRequest, ResourceKey, Selector, StatusError, UpdateOptions, Verb,
};

/// A persistent watch registration: which node wants change events for which
/// resource kind, under which selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorListener {
    pub node_name: String,
    pub gvr: GroupVersionResource,
    pub selector: Selector,
}

/// One authorization question: may this credential perform this verb on this
/// resource coordinate?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReview {
    pub verb: Verb,
    pub gvr: GroupVersionResource,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub subresource: Option<String>,
}

impl AccessReview {
    pub fn for_key(verb: Verb, key: &ResourceKey, subresource: Option<&str>) -> Self {
        Self {
            verb,
            gvr: key.gvr.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            subresource: subresource.map(str::to_string),
        }
    }
}

/// Outcome of an [`AccessReview`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

/// Verb-level operations against the dynamic resource backend.
///
/// Implementations resolve the key's group/version/resource to a concrete
/// endpoint; namespace and name scoping follow the key.
#[async_trait]
pub trait DynamicResourceClient: Send + Sync {
    async fn get(
        &self,
        key: &ResourceKey,
        options: &GetOptions,
    ) -> Result<DynamicObject, StatusError>;

    async fn list(
        &self,
        key: &ResourceKey,
        options: &ListOptions,
    ) -> Result<DynamicList, StatusError>;

    async fn create(
        &self,
        key: &ResourceKey,
        object: &DynamicObject,
        options: &CreateOptions,
        subresource: Option<&str>,
    ) -> Result<DynamicObject, StatusError>;

    async fn update(
        &self,
        key: &ResourceKey,
        object: &DynamicObject,
        options: &UpdateOptions,
        subresource: Option<&str>,
    ) -> Result<DynamicObject, StatusError>;

    async fn update_status(
        &self,
        key: &ResourceKey,
        object: &DynamicObject,
        options: &UpdateOptions,
    ) -> Result<DynamicObject, StatusError>;

    async fn delete(&self, key: &ResourceKey, options: &DeleteOptions)
        -> Result<(), StatusError>;

    async fn patch(
        &self,
        key: &ResourceKey,
        request: &PatchRequest,
    ) -> Result<DynamicObject, StatusError>;
}

/// Produces backend clients, either with the service's own identity or
/// impersonating a caller credential.
pub trait DynamicClientFactory: Send + Sync {
    /// Client running with the service identity.
    fn default_client(&self) -> Arc<dyn DynamicResourceClient>;

    /// Client scoped to the caller's bearer token. Fails when the token
    /// cannot be turned into a usable identity.
    fn scoped_client(&self, token: &str) -> Result<Arc<dyn DynamicResourceClient>, StatusError>;
}

/// Answers access reviews for watch registrations.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        review: &AccessReview,
        token: &str,
    ) -> Result<AccessDecision, StatusError>;
}

/// Records watch registrations for later event fan-out.
pub trait ListenerRegistry: Send + Sync {
    fn add_listener(&self, listener: SelectorListener) -> Result<(), StatusError>;
}

/// Strips or rewrites response content before it leaves the cloud side.
///
/// Kept as a seam because deployments prune node-irrelevant fields here;
/// the default passes objects through untouched.
pub trait ResponseFilter: Send + Sync {
    fn filter_object(&self, object: &mut DynamicObject, node_name: &str);

    fn filter_list(&self, list: &mut DynamicList, node_name: &str) {
        for item in &mut list.items {
            self.filter_object(item, node_name);
        }
    }
}

/// Pass-through filter; the default when no pruning is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFilter;

impl ResponseFilter for PassthroughFilter {
    fn filter_object(&self, _object: &mut DynamicObject, _node_name: &str) {}
}
