// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot fan-out to subscribed connections.
//!
//! One broadcast channel per resource, plus a cache of the latest snapshot so
//! a new subscriber (or one that lagged) can be brought current immediately.
//! Publishing never blocks on slow receivers: a receiver that falls behind
//! sees `Lagged` and refetches the latest snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use turnstile_core::{ResourceId, Snapshot};

/// Per-resource channel capacity; laggards refetch the latest snapshot
const CHANNEL_CAPACITY: usize = 64;

struct Channel {
    tx: broadcast::Sender<Snapshot>,
    latest: Option<Snapshot>,
}

/// Routes snapshots from coordinator tasks to subscribed connections
#[derive(Clone, Default)]
pub struct Gateway {
    inner: Arc<RwLock<HashMap<ResourceId, Channel>>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a freshly registered resource
    pub fn register(&self, resource_id: &str) {
        let mut channels = self.inner.write().unwrap_or_else(|e| e.into_inner());
        channels.entry(resource_id.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            Channel { tx, latest: None }
        });
    }

    /// Publish a snapshot to every subscriber, fire-and-forget
    pub fn publish(&self, snapshot: Snapshot) {
        let mut channels = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(channel) = channels.get_mut(&snapshot.resource_id) {
            // send fails only when there are no receivers; the latest cache
            // still serves the next subscriber
            let _ = channel.tx.send(snapshot.clone());
            channel.latest = Some(snapshot);
        }
    }

    /// Subscribe to a resource; returns the latest snapshot for catch-up
    pub fn subscribe(
        &self,
        resource_id: &str,
    ) -> Option<(Option<Snapshot>, broadcast::Receiver<Snapshot>)> {
        let channels = self.inner.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(resource_id)
            .map(|c| (c.latest.clone(), c.tx.subscribe()))
    }

    /// Latest published snapshot, if any
    pub fn latest(&self, resource_id: &str) -> Option<Snapshot> {
        let channels = self.inner.read().unwrap_or_else(|e| e.into_inner());
        channels.get(resource_id).and_then(|c| c.latest.clone())
    }

    /// Live receiver count for one resource
    pub fn subscriber_count(&self, resource_id: &str) -> usize {
        let channels = self.inner.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(resource_id)
            .map(|c| c.tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop the channel for an evicted resource
    pub fn remove(&self, resource_id: &str) {
        let mut channels = self.inner.write().unwrap_or_else(|e| e.into_inner());
        channels.remove(resource_id);
    }

    pub fn resource_count(&self) -> usize {
        let channels = self.inner.read().unwrap_or_else(|e| e.into_inner());
        channels.len()
    }

    pub fn total_subscribers(&self) -> usize {
        let channels = self.inner.read().unwrap_or_else(|e| e.into_inner());
        channels.values().map(|c| c.tx.receiver_count()).sum()
    }
}
