// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The runtime application entity: immutable identity, mutable outcome,
//! lease counting and a re-armable completion signal.
//!
//! One `Arc<Application>` is shared by every caller that issued the same
//! logical request. Identity fields never change after construction; the
//! outcome (status, reason, error, response body) is written as a whole by
//! the reply-merge path before the completion signal fires, so waiters never
//! observe partial state. The lease count tracks how many callers currently
//! hold the application and is guarded by its own lock, independent of the
//! outcome.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use edgeflux_protocol::{
    ApplicationDocument, ApplicationStatus, ListOptions, ResourceKey, Selector, StatusError, Verb,
};

use crate::backend::SelectorListener;

#[derive(Debug, Default)]
struct Outcome {
    status: ApplicationStatus,
    reason: String,
    error: Option<StatusError>,
    resp_body: Vec<u8>,
}

#[derive(Debug, Default)]
struct Lease {
    count: u64,
    /// Wall-clock time of the last count-drop; only meaningful at count 0.
    last_close: Option<DateTime<Utc>>,
}

/// One tracked, deduplicated proxied resource request.
pub struct Application {
    key: ResourceKey,
    verb: Verb,
    node_name: String,
    subresource: Option<String>,
    option: Vec<u8>,
    req_body: Vec<u8>,
    token: String,

    id: OnceLock<String>,
    outcome: Mutex<Outcome>,
    lease: Mutex<Lease>,
    /// Completion broadcast; `true` while the current cycle has a result.
    done: watch::Sender<bool>,
}

impl Application {
    /// Create a new application in `PreApplying` holding one lease for the
    /// creating caller.
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
        let (done, _) = watch::channel(false);
        let app = Self {
            key,
            verb,
            node_name: node_name.to_string(),
            subresource: subresource.map(str::to_string),
            option,
            req_body,
            token: token.to_string(),
            id: OnceLock::new(),
            outcome: Mutex::new(Outcome::default()),
            lease: Mutex::new(Lease::default()),
            done,
        };
        app.add();
        app
    }

    fn outcome(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lease(&self) -> MutexGuard<'_, Lease> {
        self.lease.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lazily compute and memoize the content fingerprint.
    pub fn identifier(&self) -> &str {
        self.id.get_or_init(|| self.document_base().fingerprint())
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn status(&self) -> ApplicationStatus {
        self.outcome().status
    }

    pub fn reason(&self) -> String {
        self.outcome().reason.clone()
    }

    pub fn error(&self) -> Option<StatusError> {
        self.outcome().error.clone()
    }

    pub fn resp_body(&self) -> Vec<u8> {
        self.outcome().resp_body.clone()
    }

    pub(crate) fn set_status(&self, status: ApplicationStatus) {
        self.outcome().status = status;
    }

    /// Force the current cycle to `Failed` with a transport-level reason.
    pub(crate) fn fail(&self, reason: String) {
        let mut outcome = self.outcome();
        outcome.status = ApplicationStatus::Failed;
        outcome.reason = reason;
    }

    /// Merge a returned document into the local outcome. The outcome is
    /// fully written under the lock before any waiter can observe it.
    pub(crate) fn merge(&self, reply: &ApplicationDocument) {
        let mut outcome = self.outcome();
        outcome.status = reply.status;
        outcome.reason = reply.reason.clone();
        outcome.error = reply.error.clone();
        outcome.resp_body = reply.resp_body.clone();
    }

    fn document_base(&self) -> ApplicationDocument {
        ApplicationDocument::new(
            self.key.clone(),
            self.verb,
            &self.node_name,
            self.subresource.as_deref(),
            self.option.clone(),
            self.req_body.clone(),
            &self.token,
        )
    }

    /// Snapshot the full wire form, including the current outcome.
    pub fn snapshot(&self) -> ApplicationDocument {
        let mut doc = self.document_base();
        doc.id = self.identifier().to_string();
        let outcome = self.outcome();
        doc.status = outcome.status;
        doc.reason = outcome.reason.clone();
        doc.error = outcome.error.clone();
        doc.resp_body = outcome.resp_body.clone();
        doc
    }

    /// Convert a watch application into its persistent listener, scoping the
    /// field selector to the key's namespace when one is set.
    pub fn to_listener(&self, options: &ListOptions) -> SelectorListener {
        watch_listener(&self.document_base(), options)
    }

    /// Suspend until the completion signal fires. Safe for any number of
    /// concurrent waiters; all are released together.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Fire the completion signal. Idempotent within a cycle.
    pub(crate) fn call(&self) {
        let _ = self.done.send(true);
    }

    /// Re-arm a completed application for a new cycle: release any stale
    /// waiter, clear the previous outcome and return to `PreApplying`.
    pub(crate) fn reset(&self) {
        self.call();
        {
            let mut outcome = self.outcome();
            outcome.status = ApplicationStatus::PreApplying;
            outcome.reason.clear();
            outcome.error = None;
            outcome.resp_body.clear();
        }
        self.done.send_replace(false);
    }

    /// Take one more lease on this application.
    pub(crate) fn add(&self) {
        self.lease().count += 1;
    }

    /// Release one lease. Stamps the close time and flips the status to
    /// `Completed` exactly when the count reaches zero; a no-op at zero.
    pub fn close(&self) {
        let mut lease = self.lease();
        if lease.count == 0 {
            return;
        }
        lease.last_close = Some(Utc::now());
        lease.count -= 1;
        if lease.count == 0 {
            self.outcome().status = ApplicationStatus::Completed;
        }
    }

    pub fn lease_count(&self) -> u64 {
        self.lease().count
    }

    /// Last close time, present only while no caller holds a lease.
    pub fn last_close_time(&self) -> Option<DateTime<Utc>> {
        let lease = self.lease();
        if lease.count == 0 {
            lease.last_close
        } else {
            None
        }
    }
}

/// Build the persistent listener a watch application registers: the request
/// selectors, with a namespace term conjoined when the key is namespaced.
pub(crate) fn watch_listener(
    doc: &ApplicationDocument,
    options: &ListOptions,
) -> SelectorListener {
    let mut selector = Selector::new(
        options.label_selector.as_deref(),
        options.field_selector.as_deref(),
    );
    if let Some(namespace) = &doc.key.namespace {
        selector = selector.and_field(&format!("metadata.namespace={namespace}"));
    }
    SelectorListener {
        node_name: doc.node_name.clone(),
        gvr: doc.key.gvr.clone(),
        selector,
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("key", &self.key.to_string())
            .field("verb", &self.verb)
            .field("node_name", &self.node_name)
            .field("status", &self.status())
            .finish()
    }
}
