// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Edge-side proxy agent: builds, deduplicates and applies applications.
//!
//! `generate` turns an intercepted resource request into a tracked
//! [`Application`], handing back the already-tracked instance when an
//! identical request is in flight. `apply` drives one request/reply cycle to
//! the cloud center and blocks the caller until a terminal outcome. A
//! periodic sweeper reclaims applications every caller has released.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use edgeflux_protocol::{
    application_resource, to_bytes, ApplicationDocument, ApplicationStatus, DynamicObject,
    Message, MessageLayer, ResourceKey, Verb, GROUP_CENTER, OPERATION_APPLY, SOURCE_METAPROXY,
};

use crate::application::Application;
use crate::config::AgentConfig;
use crate::error::{ProxyError, Result};

/// Resource coordinates extracted from an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub key: ResourceKey,
    pub subresource: Option<String>,
}

/// What the interception layer knows about one caller request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Present when the request addresses a resource endpoint.
    pub resource: Option<ResourceInfo>,
    /// Caller's raw authorization credential.
    pub token: Option<String>,
}

impl RequestContext {
    pub fn new(key: ResourceKey, subresource: Option<&str>, token: &str) -> Self {
        Self {
            resource: Some(ResourceInfo {
                key,
                subresource: subresource.map(str::to_string),
            }),
            token: Some(token.to_string()),
        }
    }
}

/// The edge-side application agent.
///
/// Shared across all request handlers of one node; the live table is the
/// dedup point, keyed by content fingerprint.
pub struct Agent {
    applications: DashMap<String, Arc<Application>>,
    transport: Arc<dyn MessageLayer>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(transport: Arc<dyn MessageLayer>, config: AgentConfig) -> Self {
        Self {
            applications: DashMap::new(),
            transport,
            config,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Number of applications currently tracked.
    pub fn tracked(&self) -> usize {
        self.applications.len()
    }

    /// Build an application for the request, or join the identical one
    /// already in flight.
    ///
    /// On a dedup hit the existing instance gains one lease and the freshly
    /// built candidate is dropped. The caller owns exactly one lease either
    /// way and must pair it with [`Application::close`].
    #[instrument(skip(self, ctx, option, body), fields(node = %self.config.node_name, verb = %verb))]
    pub fn generate<O: Serialize>(
        &self,
        ctx: &RequestContext,
        verb: Verb,
        option: &O,
        body: Option<&DynamicObject>,
    ) -> Result<Arc<Application>> {
        let info = ctx.resource.as_ref().ok_or(ProxyError::NotResourceRequest)?;
        let token = ctx
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ProxyError::MissingToken)?;

        let option = to_bytes(option)?;
        let req_body = match body {
            Some(object) => to_bytes(object)?,
            None => Vec::new(),
        };

        let candidate = Arc::new(Application::new(
            info.key.clone(),
            verb,
            &self.config.node_name,
            info.subresource.as_deref(),
            option,
            req_body,
            token,
        ));
        let id = candidate.identifier().to_string();

        let existing = match self.applications.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Some(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(candidate.clone());
                None
            }
        };
        // guard dropped; touch the joined instance outside the shard lock
        if let Some(app) = existing {
            app.add();
            debug!(id = %app.identifier(), leases = app.lease_count(), "joined in-flight application");
            return Ok(app);
        }
        debug!(id = %candidate.identifier(), key = %info.key, "tracking new application");
        Ok(candidate)
    }

    /// Drive the application to a terminal outcome, sending it to the cloud
    /// center when no cycle is already in flight.
    ///
    /// Callers that join an in-flight cycle block on its completion instead
    /// of sending again. A `Completed` application is re-armed and re-sent.
    #[instrument(skip(self, app), fields(id = %app.identifier(), verb = %app.verb()))]
    pub async fn apply(&self, app: &Arc<Application>) -> Result<()> {
        let tracked = self
            .applications
            .get(app.identifier())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ProxyError::NotRegistered(app.identifier().to_string()))?;

        match tracked.status() {
            ApplicationStatus::PreApplying => {
                self.do_apply(&tracked).await;
            }
            ApplicationStatus::Completed => {
                tracked.reset();
                self.do_apply(&tracked).await;
            }
            ApplicationStatus::Rejected => return Err(tracked.rejection_error()),
            ApplicationStatus::Failed => {
                return Err(ProxyError::ApplyFailed(tracked.reason()));
            }
            ApplicationStatus::Approved => return Ok(()),
            ApplicationStatus::InApplying | ApplicationStatus::InProcessing => {
                // another caller's cycle is in flight; wait with them
            }
        }

        tracked.wait().await;

        match tracked.status() {
            ApplicationStatus::Approved => Ok(()),
            ApplicationStatus::Rejected => Err(tracked.rejection_error()),
            other => {
                debug!(status = %other, "apply cycle ended without approval");
                Err(ProxyError::ApplyFailed(tracked.reason()))
            }
        }
    }

    /// One send/await/merge cycle. Always fires the completion signal, on
    /// every path, so joined callers never hang.
    async fn do_apply(&self, app: &Arc<Application>) {
        app.set_status(ApplicationStatus::InApplying);
        let doc = app.snapshot();

        let outcome = self.send_and_merge(app, &doc).await;
        if let Err(reason) = outcome {
            warn!(id = %app.identifier(), %reason, "apply cycle failed");
            app.fail(reason);
        }
        app.call();
    }

    async fn send_and_merge(
        &self,
        app: &Arc<Application>,
        doc: &ApplicationDocument,
    ) -> std::result::Result<(), String> {
        let msg = Message::new()
            .set_route(SOURCE_METAPROXY, GROUP_CENTER)
            .set_resource_operation(&application_resource(&self.config.node_name), OPERATION_APPLY)
            .fill_body(doc)
            .map_err(|e| format!("failed to encode application: {e}"))?;

        let reply = self
            .transport
            .send_sync(&self.config.center_destination, msg, self.config.apply_timeout)
            .await
            .map_err(|e| format!("failed to access cloud application center: {e}"))?;

        let reply_doc: ApplicationDocument = reply
            .get_content()
            .map_err(|e| format!("failed to decode application response: {e}"))?;
        app.merge(&reply_doc);
        Ok(())
    }

    /// Reclaim applications whose last lease was dropped longer than the
    /// idle grace ago.
    pub fn gc(&self) {
        let grace = self.config.idle_grace;
        // counted inside retain: the table can grow concurrently mid-sweep
        let mut swept = 0usize;
        self.applications.retain(|_, app| {
            let expired = app
                .last_close_time()
                .map(|t| {
                    chrono::Utc::now()
                        .signed_duration_since(t)
                        .to_std()
                        .map(|idle| idle >= grace)
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            if expired {
                swept += 1;
            }
            !expired
        });
        if swept > 0 {
            info!(swept, remaining = self.applications.len(), "reclaimed idle applications");
        }
    }

    /// Run the periodic sweeper until `shutdown` flips to true.
    pub fn spawn_gc(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let agent = self.clone();
        let period = agent.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => agent.gc(),
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            debug!("application sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn get_application(&self, id: &str) -> Option<Arc<Application>> {
        self.applications.get(id).map(|entry| entry.value().clone())
    }
}

impl Application {
    /// Error a rejected application surfaces to its callers: the structured
    /// backend error when the center carried one, the reason otherwise.
    pub(crate) fn rejection_error(&self) -> ProxyError {
        match self.error() {
            Some(status) => ProxyError::Backend(status),
            None => ProxyError::ApplyFailed(self.reason()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflux_protocol::{GetOptions, GroupVersionResource, MemoryMessageLayer};
    use std::time::Duration;

    fn deployment_ctx() -> RequestContext {
        RequestContext::new(
            ResourceKey::new(
                GroupVersionResource::new("apps", "v1", "deployments"),
                Some("default"),
                Some("web"),
            ),
            None,
            "Bearer t1",
        )
    }

    fn test_agent() -> Agent {
        let transport = Arc::new(MemoryMessageLayer::new());
        let mut config = AgentConfig::new("edge-0");
        config.idle_grace = Duration::from_millis(0);
        Agent::new(transport, config)
    }

    #[tokio::test]
    async fn test_generate_requires_resource_info() {
        let agent = test_agent();
        let ctx = RequestContext {
            resource: None,
            token: Some("Bearer t1".to_string()),
        };
        let result = agent.generate(&ctx, Verb::Get, &GetOptions::default(), None);
        assert!(matches!(result, Err(ProxyError::NotResourceRequest)));
    }

    #[tokio::test]
    async fn test_generate_requires_token() {
        let agent = test_agent();
        let mut ctx = deployment_ctx();
        ctx.token = None;
        let result = agent.generate(&ctx, Verb::Get, &GetOptions::default(), None);
        assert!(matches!(result, Err(ProxyError::MissingToken)));

        ctx.token = Some(String::new());
        let result = agent.generate(&ctx, Verb::Get, &GetOptions::default(), None);
        assert!(matches!(result, Err(ProxyError::MissingToken)));
    }

    #[tokio::test]
    async fn test_generate_dedups_identical_requests() {
        let agent = test_agent();
        let ctx = deployment_ctx();
        let first = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        let second = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lease_count(), 2);
        assert_eq!(agent.tracked(), 1);
    }

    #[tokio::test]
    async fn test_generate_distinguishes_by_token_and_verb() {
        let agent = test_agent();
        let ctx = deployment_ctx();
        let get = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        let delete = agent
            .generate(&ctx, Verb::Delete, &edgeflux_protocol::DeleteOptions::default(), None)
            .unwrap();
        assert!(!Arc::ptr_eq(&get, &delete));

        let mut other = deployment_ctx();
        other.token = Some("Bearer t2".to_string());
        let other_get = agent
            .generate(&other, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        assert_ne!(get.identifier(), other_get.identifier());
        assert_eq!(agent.tracked(), 3);
    }

    #[tokio::test]
    async fn test_apply_unregistered_application_fails() {
        let agent = test_agent();
        let ctx = deployment_ctx();
        let app = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        app.close();
        agent.gc();
        let result = agent.apply(&app).await;
        assert!(matches!(result, Err(ProxyError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn test_apply_transport_failure_marks_failed_and_is_retryable() {
        // no center registered on the bus: send_sync fails with NoRoute
        let agent = test_agent();
        let ctx = deployment_ctx();
        let app = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();

        let result = agent.apply(&app).await;
        assert!(matches!(result, Err(ProxyError::ApplyFailed(_))));
        assert_eq!(app.status(), ApplicationStatus::Failed);
        assert!(app.reason().contains("failed to access cloud application center"));

        // second apply on a Failed application reports, it does not resend
        let result = agent.apply(&app).await;
        assert!(matches!(result, Err(ProxyError::ApplyFailed(_))));
    }

    #[tokio::test]
    async fn test_apply_approved_short_circuits() {
        let agent = test_agent();
        let ctx = deployment_ctx();
        let app = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        app.set_status(ApplicationStatus::Approved);
        app.call();
        agent.apply(&app).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_rejected_surfaces_backend_error() {
        let agent = test_agent();
        let ctx = deployment_ctx();
        let app = agent
            .generate(&ctx, Verb::Get, &GetOptions::default(), None)
            .unwrap();
        let mut reply = app.snapshot();
        reply.status = ApplicationStatus::Rejected;
        reply.error = Some(edgeflux_protocol::StatusError::forbidden("denied"));
        app.merge(&reply);
        app.call();

        match agent.apply(&app).await {
            Err(ProxyError::Backend(status)) => assert_eq!(status.code, 403),
            other => panic!("expected Backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gc_spares_held_and_fresh_applications() {
        let transport = Arc::new(MemoryMessageLayer::new());
        let mut config = AgentConfig::new("edge-0");
        config.idle_grace = Duration::from_secs(3600);
        let agent = Agent::new(transport, config);

        let held = agent
            .generate(&deployment_ctx(), Verb::Get, &GetOptions::default(), None)
            .unwrap();

        let mut list_ctx = deployment_ctx();
        if let Some(info) = &mut list_ctx.resource {
            info.key.name = None;
        }
        let released = agent
            .generate(&list_ctx, Verb::List, &edgeflux_protocol::ListOptions::default(), None)
            .unwrap();
        released.close();

        agent.gc();
        // held has a live lease, released is within the grace window
        assert_eq!(agent.tracked(), 2);
        assert!(agent.get_application(held.identifier()).is_some());
    }

    #[tokio::test]
    async fn test_gc_reclaims_idle_applications() {
        let agent = test_agent(); // zero grace
        let app = agent
            .generate(&deployment_ctx(), Verb::Get, &GetOptions::default(), None)
            .unwrap();
        app.close();
        assert_eq!(app.status(), ApplicationStatus::Completed);

        agent.gc();
        assert_eq!(agent.tracked(), 0);
    }

    #[tokio::test]
    async fn test_spawn_gc_stops_on_shutdown() {
        let agent = Arc::new(test_agent());
        let (tx, rx) = watch::channel(false);
        let handle = agent.spawn_gc(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
