// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-slot countdown for a resource's outstanding offer
//!
//! At most one timer is armed per resource. Arming replaces any previously
//! armed deadline (cancel-and-replace, never two concurrent countdowns), and
//! cancel is a no-op when nothing is armed. Expiry never mutates resource
//! state here; the owner feeds an offer-timeout action through the same
//! serialized path as client actions.

use std::time::Instant;

/// The at-most-one outstanding offer countdown for a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferTimer {
    deadline: Option<Instant>,
}

impl OfferTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the countdown, replacing any previously armed deadline
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Disarm; no-op if nothing is armed
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm and report true if the deadline has passed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
