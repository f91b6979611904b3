// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process implementation of [`MessageLayer`].
//!
//! Routes messages between named destinations over tokio channels and keeps a
//! pending-reply table keyed by request id for `send_sync` correlation. Used
//! by the core's tests and by embedded single-process deployments where edge
//! and cloud halves share a runtime.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

use crate::message::Message;
use crate::transport::{MessageLayer, TransportError};

/// Default capacity of a destination inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Channel-backed message layer for a single process.
pub struct MemoryMessageLayer {
    routes: Mutex<HashMap<String, mpsc::Sender<Message>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

impl MemoryMessageLayer {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a destination and return its inbox.
    ///
    /// Re-registering a name replaces the previous inbox; in-flight sends to
    /// the old inbox fail with [`TransportError::ChannelClosed`].
    pub async fn register(&self, destination: &str) -> mpsc::Receiver<Message> {
        self.register_with_capacity(destination, DEFAULT_INBOX_CAPACITY)
            .await
    }

    /// Register a destination with an explicit inbox capacity.
    pub async fn register_with_capacity(
        &self,
        destination: &str,
        capacity: usize,
    ) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity);
        self.routes.lock().await.insert(destination.to_string(), tx);
        debug!(destination, "registered transport destination");
        rx
    }

    async fn deliver(&self, destination: &str, message: Message) -> Result<(), TransportError> {
        let sender = {
            let routes = self.routes.lock().await;
            routes
                .get(destination)
                .cloned()
                .ok_or_else(|| TransportError::NoRoute(destination.to_string()))?
        };
        sender
            .send(message)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Default for MemoryMessageLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLayer for MemoryMessageLayer {
    async fn send(&self, destination: &str, message: Message) -> Result<(), TransportError> {
        self.deliver(destination, message).await
    }

    async fn send_sync(
        &self,
        destination: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let id = message.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        // delivery can block on a full inbox, so it shares the deadline with
        // the reply wait
        let deliver_and_wait = async {
            self.deliver(destination, message).await?;
            rx.await.map_err(|_| TransportError::ChannelClosed)
        };

        match tokio::time::timeout(timeout, deliver_and_wait).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                self.pending.lock().await.remove(&id);
                Err(e)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn response(&self, message: Message) -> Result<(), TransportError> {
        let waiter = self
            .pending
            .lock()
            .await
            .remove(&message.parent_id)
            .ok_or_else(|| TransportError::UnknownCorrelation(message.parent_id.clone()))?;
        waiter.send(message).map_err(|_| TransportError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_to_registered_destination() {
        let layer = MemoryMessageLayer::new();
        let mut inbox = layer.register("center").await;

        let msg = Message::new();
        let id = msg.id.clone();
        layer.send("center", msg).await.unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.id, id);
    }

    #[tokio::test]
    async fn test_send_to_unknown_destination_fails() {
        let layer = MemoryMessageLayer::new();
        let result = layer.send("nowhere", Message::new()).await;
        assert!(matches!(result, Err(TransportError::NoRoute(d)) if d == "nowhere"));
    }

    #[tokio::test]
    async fn test_send_sync_round_trip() {
        let layer = std::sync::Arc::new(MemoryMessageLayer::new());
        let mut inbox = layer.register("center").await;

        let responder = layer.clone();
        tokio::spawn(async move {
            let request = inbox.recv().await.unwrap();
            let reply = Message::reply_to(&request.id).fill_body(&"ok").unwrap();
            responder.response(reply).await.unwrap();
        });

        let reply = layer
            .send_sync("center", Message::new(), Duration::from_secs(2))
            .await
            .unwrap();
        let body: String = reply.get_content().unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_sync_times_out_without_reply() {
        let layer = MemoryMessageLayer::new();
        let _inbox = layer.register("center").await;

        let result = layer
            .send_sync("center", Message::new(), Duration::from_millis(250))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout(250))));

        // the pending entry is cleaned up on timeout
        assert!(layer.pending.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_sync_times_out_when_inbox_full() {
        let layer = MemoryMessageLayer::new();
        let _inbox = layer.register_with_capacity("center", 1).await;
        // fill the inbox so the next delivery blocks
        layer.send("center", Message::new()).await.unwrap();

        let result = layer
            .send_sync("center", Message::new(), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout(100))));
        assert!(layer.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_response_without_pending_request_fails() {
        let layer = MemoryMessageLayer::new();
        let reply = Message::reply_to("missing-id");
        let result = layer.response(reply).await;
        assert!(matches!(result, Err(TransportError::UnknownCorrelation(_))));
    }

    #[tokio::test]
    async fn test_send_sync_no_route_cleans_pending() {
        let layer = MemoryMessageLayer::new();
        let result = layer
            .send_sync("nowhere", Message::new(), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(TransportError::NoRoute(_))));
        assert!(layer.pending.lock().await.is_empty());
    }
}
