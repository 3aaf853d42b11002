// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client identities and the per-resource identity ledger
//!
//! Identities are opaque integers, unique for the lifetime of the process and
//! scoped to a single resource: the same browser holds different identities on
//! different resources. A returning client presents a previously issued
//! identity to resume its queue position or holder status after a disconnect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque client identity, issued once per (resource, first join)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues identities for one resource
///
/// A monotonic counter: values are never reused, even after the client leaves.
/// `validate` answers "was this ever issued here", regardless of current
/// queue/holder membership — a stale identity validates but then fails the
/// relevant coordinator precondition, which is the correct rejection path.
#[derive(Debug, Clone)]
pub struct IdentityLedger {
    next: u64,
}

impl IdentityLedger {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue a fresh identity, unique among all ever issued for this resource
    pub fn issue(&mut self) -> ClientId {
        let id = ClientId(self.next);
        self.next += 1;
        id
    }

    /// True iff this identity was issued for this resource
    pub fn validate(&self, identity: ClientId) -> bool {
        identity.0 >= 1 && identity.0 < self.next
    }
}

impl Default for IdentityLedger {
    fn default() -> Self {
        Self::new()
    }
}
