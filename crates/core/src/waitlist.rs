// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO waitlist for one resource
//!
//! Order changes only by removal, never by demotion or promotion while
//! waiting. The entry at position 0 is the only entry ever eligible to carry
//! the offered flag. Lookup is a linear scan; queues are tens of entries, not
//! millions.

use crate::ident::ClientId;
use serde::{Deserialize, Serialize};

/// A pending client in a resource's waitlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub identity: ClientId,
    pub display_name: String,
    pub offered: bool,
}

/// Ordered collection of pending clients for one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waitlist {
    entries: Vec<QueueEntry>,
}

impl Waitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new non-offered entry at the tail
    pub fn append(&mut self, identity: ClientId, display_name: impl Into<String>) {
        self.entries.push(QueueEntry {
            identity,
            display_name: display_name.into(),
            offered: false,
        });
    }

    /// Remove an entry by identity, preserving the relative order of the rest
    pub fn remove(&mut self, identity: ClientId) -> Option<QueueEntry> {
        let pos = self.position_of(identity)?;
        Some(self.entries.remove(pos))
    }

    pub fn peek_head(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    pub fn position_of(&self, identity: ClientId) -> Option<usize> {
        self.entries.iter().position(|e| e.identity == identity)
    }

    pub fn contains(&self, identity: ClientId) -> bool {
        self.position_of(identity).is_some()
    }

    /// The entry currently marked offered, if any
    pub fn offered_entry(&self) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.offered)
    }

    /// Mark the head entry as offered, returning its identity
    pub fn mark_head_offered(&mut self) -> Option<ClientId> {
        let head = self.entries.first_mut()?;
        head.offered = true;
        Some(head.identity)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }
}
