// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud-side application center: authorize, execute, respond.
//!
//! The center consumes `apply` messages off the bus, executes the carried
//! application against the resource backend and routes a correlated reply
//! back to the originating node. Every processed application leaves a
//! TTL-bounded record for observability; a periodic sweeper evicts expired
//! records.
//!
//! Watch is the odd verb out: it performs an explicit access review against
//! the caller's token and registers a persistent listener instead of
//! touching the backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use edgeflux_protocol::{
    application_resource, to_bytes, ApplicationDocument, ApplicationStatus, DynamicList,
    DynamicObject, GetOptions, ListOptions, Message, MessageLayer, PatchRequest, Verb,
    GROUP_RESOURCE, OPERATION_APPLICATION_RESPONSE, SOURCE_CENTER,
};

use crate::backend::{
    AccessReview, Authorizer, DynamicClientFactory, DynamicResourceClient, ListenerRegistry,
    PassthroughFilter, ResponseFilter,
};
use crate::config::CenterConfig;
use crate::error::{ProxyError, Result};

/// What a successful verb produced.
#[derive(Debug, Clone)]
pub enum ResponsePayload {
    Object(DynamicObject),
    List(DynamicList),
}

impl ResponsePayload {
    /// Filter node-facing content and serialize into response-body bytes.
    fn into_filtered_bytes(
        self,
        filter: &dyn ResponseFilter,
        node_name: &str,
        verb: Verb,
    ) -> Result<Vec<u8>> {
        match self {
            ResponsePayload::Object(mut object) => {
                if matches!(verb, Verb::Get | Verb::List) {
                    filter.filter_object(&mut object, node_name);
                }
                Ok(to_bytes(&object)?)
            }
            ResponsePayload::List(mut list) => {
                if matches!(verb, Verb::Get | Verb::List) {
                    filter.filter_list(&mut list, node_name);
                }
                Ok(to_bytes(&list)?)
            }
        }
    }
}

/// Record of a finished application, kept until its TTL expires.
#[derive(Debug, Clone)]
struct ProcessedEntry {
    status: ApplicationStatus,
    finished_at: DateTime<Utc>,
}

/// The cloud-side application center.
pub struct Center {
    processed: DashMap<String, ProcessedEntry>,
    transport: Arc<dyn MessageLayer>,
    clients: Arc<dyn DynamicClientFactory>,
    authorizer: Arc<dyn Authorizer>,
    listeners: Arc<dyn ListenerRegistry>,
    filter: Arc<dyn ResponseFilter>,
    config: CenterConfig,
}

impl Center {
    pub fn new(
        transport: Arc<dyn MessageLayer>,
        clients: Arc<dyn DynamicClientFactory>,
        authorizer: Arc<dyn Authorizer>,
        listeners: Arc<dyn ListenerRegistry>,
        config: CenterConfig,
    ) -> Self {
        Self {
            processed: DashMap::new(),
            transport,
            clients,
            authorizer,
            listeners,
            filter: Arc::new(PassthroughFilter),
            config,
        }
    }

    /// Replace the pass-through response filter.
    pub fn with_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Number of processed records currently retained.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Terminal status of a processed application, while its record lives.
    pub fn processed_status(&self, id: &str) -> Option<ApplicationStatus> {
        self.processed.get(id).map(|entry| entry.status)
    }

    /// Handle one `apply` message off the bus: decode, execute, respond.
    ///
    /// Undecodable messages are logged and dropped; there is no document to
    /// route an error back with.
    #[instrument(skip(self, msg), fields(msg_id = %msg.id))]
    pub async fn process(&self, msg: Message) {
        let mut doc: ApplicationDocument = match msg.get_content() {
            Ok(doc) => doc,
            Err(e) => {
                error!(%e, "dropping undecodable application message");
                return;
            }
        };
        debug!(id = %doc.id, key = %doc.key, verb = %doc.verb, node = %doc.node_name, "processing application");

        let outcome = self.process_application(&mut doc).await;
        let (status, payload, failure) = match outcome {
            Ok(payload) => (ApplicationStatus::Approved, payload, None),
            Err(e) => (ApplicationStatus::Rejected, None, Some(e)),
        };

        self.processed.insert(
            doc.id.clone(),
            ProcessedEntry {
                status,
                finished_at: Utc::now(),
            },
        );
        self.respond(doc, &msg.id, status, payload, failure).await;
    }

    /// Execute one application against the backend. `Ok(None)` means the verb
    /// succeeded without response content.
    async fn process_application(
        &self,
        doc: &mut ApplicationDocument,
    ) -> Result<Option<ResponsePayload>> {
        doc.status = ApplicationStatus::InProcessing;

        if doc.verb == Verb::Watch {
            return self.register_watch(doc).await.map(|()| None);
        }

        let client = self.client_for(&doc.token)?;
        match doc.verb {
            Verb::Get => {
                let options: GetOptions = doc.option_to()?;
                self.require_name(doc)?;
                let object = client.get(&doc.key, &options).await?;
                Ok(Some(ResponsePayload::Object(object)))
            }
            Verb::List => {
                let options: ListOptions = doc.option_to()?;
                let list = client.list(&doc.key, &options).await?;
                Ok(Some(ResponsePayload::List(list)))
            }
            Verb::Create => {
                let object: DynamicObject = doc.req_body_to()?;
                let options = doc.option_to()?;
                let created = client
                    .create(&doc.key, &object, &options, doc.subresource.as_deref())
                    .await?;
                Ok(Some(ResponsePayload::Object(created)))
            }
            Verb::Update => {
                let object: DynamicObject = doc.req_body_to()?;
                let options = doc.option_to()?;
                self.require_name(doc)?;
                let updated = client
                    .update(&doc.key, &object, &options, doc.subresource.as_deref())
                    .await?;
                Ok(Some(ResponsePayload::Object(updated)))
            }
            Verb::UpdateStatus => {
                let object: DynamicObject = doc.req_body_to()?;
                let options = doc.option_to()?;
                self.require_name(doc)?;
                let updated = client.update_status(&doc.key, &object, &options).await?;
                Ok(Some(ResponsePayload::Object(updated)))
            }
            Verb::Delete => {
                let options = doc.option_to()?;
                self.require_name(doc)?;
                client.delete(&doc.key, &options).await?;
                Ok(None)
            }
            Verb::Patch => {
                let request: PatchRequest = doc.option_to()?;
                let patched = client.patch(&doc.key, &request).await?;
                Ok(Some(ResponsePayload::Object(patched)))
            }
            Verb::Watch => unreachable!("watch handled above"),
        }
    }

    /// Watch applications never reach the backend: review the caller's
    /// access, then persist a listener scoped to the key's namespace.
    async fn register_watch(&self, doc: &ApplicationDocument) -> Result<()> {
        let token = parse_bearer(&doc.token)?;
        let review = AccessReview::for_key(Verb::Watch, &doc.key, doc.subresource.as_deref());
        let decision = self.authorizer.authorize(&review, token).await?;
        if !decision.allowed {
            return Err(ProxyError::Unauthorized(decision.reason));
        }

        let options: ListOptions = doc.option_to()?;
        let listener = crate::application::watch_listener(doc, &options);
        self.listeners
            .add_listener(listener)
            .map_err(|e| ProxyError::Listener(e.to_string()))
    }

    fn client_for(&self, raw_token: &str) -> Result<Arc<dyn DynamicResourceClient>> {
        if self.config.require_authorization {
            let token = parse_bearer(raw_token)?;
            Ok(self.clients.scoped_client(token)?)
        } else {
            Ok(self.clients.default_client())
        }
    }

    fn require_name(&self, doc: &ApplicationDocument) -> Result<()> {
        if doc.key.name.is_none() {
            return Err(ProxyError::MissingName(
                doc.key.to_string(),
                doc.verb.to_string(),
            ));
        }
        Ok(())
    }

    /// Fill the outcome into the document and route it back to the node.
    async fn respond(
        &self,
        mut doc: ApplicationDocument,
        parent_id: &str,
        status: ApplicationStatus,
        payload: Option<ResponsePayload>,
        failure: Option<ProxyError>,
    ) {
        doc.status = status;
        match failure {
            Some(ProxyError::Backend(status_error)) => {
                doc.reason = status_error.to_string();
                doc.error = Some(status_error);
            }
            Some(other) => doc.reason = other.to_string(),
            None => {}
        }

        if let Some(payload) = payload {
            match payload.into_filtered_bytes(self.filter.as_ref(), &doc.node_name, doc.verb) {
                Ok(bytes) => doc.resp_body = bytes,
                // leave the body empty rather than drop the reply
                Err(e) => error!(id = %doc.id, %e, "failed to encode response body"),
            }
        }

        let reply = Message::reply_to(parent_id)
            .set_route(SOURCE_CENTER, GROUP_RESOURCE)
            .set_resource_operation(
                &application_resource(&doc.node_name),
                OPERATION_APPLICATION_RESPONSE,
            )
            .fill_body(&doc);
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                error!(id = %doc.id, %e, "failed to encode application reply");
                return;
            }
        };
        if let Err(e) = self.transport.response(reply).await {
            warn!(id = %doc.id, %e, "failed to route application reply");
        }
    }

    /// Evict processed records older than the configured TTL.
    pub fn gc(&self) {
        let ttl = self.config.entry_ttl;
        // counted inside retain: the table can grow concurrently mid-sweep
        let mut evicted = 0usize;
        self.processed.retain(|_, entry| {
            let keep = Utc::now()
                .signed_duration_since(entry.finished_at)
                .to_std()
                .map(|age| age < ttl)
                .unwrap_or(true);
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            info!(evicted, remaining = self.processed.len(), "evicted processed applications");
        }
    }

    /// Run the periodic record sweeper until `shutdown` flips to true.
    pub fn spawn_gc(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let center = self.clone();
        let period = center.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => center.gc(),
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            debug!("processed-record sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Extract the credential from a `Bearer <token>` header value.
fn parse_bearer(raw: &str) -> Result<&str> {
    if raw.is_empty() {
        return Err(ProxyError::MissingToken);
    }
    let mut parts = raw.splitn(3, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || parts.next().is_some() {
        return Err(ProxyError::InvalidToken);
    }
    Ok(token)
}
