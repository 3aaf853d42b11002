// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-resource coordinator state machine
//!
//! One resource's holder, waitlist, and active offer, driven by client
//! actions. `apply` is a pure transition function: it returns the new state
//! plus the effects the owner must execute, and never performs IO itself.
//! The owner is responsible for processing actions one at a time per
//! resource; under that discipline the invariants in `invariant_violation`
//! hold after every accepted transition.

use crate::clock::Clock;
use crate::effect::{AuditEvent, Effect};
use crate::error::ActionError;
use crate::ident::{ClientId, IdentityLedger};
use crate::snapshot::{HolderInfo, Snapshot, WaiterInfo};
use crate::waitlist::Waitlist;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A resource identifier, minted at creation time
pub type ResourceId = String;

/// Creation-time parameters; `timeout` is constant thereafter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    pub description: Option<String>,
    pub timeout: Duration,
}

/// The identity currently granted exclusive access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub identity: ClientId,
    pub display_name: String,
}

/// Client actions and the internal timeout, all funneled through one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Join the waitlist, optionally resuming a previously issued identity
    Join {
        identity: Option<ClientId>,
        display_name: String,
    },
    /// Give up exclusive access (holder only)
    Release { identity: ClientId },
    /// Accept the outstanding offer (offered head only)
    Accept { identity: ClientId },
    /// Decline the outstanding offer and leave the waitlist
    Reject { identity: ClientId },
    /// Leave the waitlist from any position
    Leave { identity: ClientId },
    /// Fired by the offer timer; equivalent to a reject, audited as a timeout
    OfferTimeout,
}

/// Result of an accepted transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: ResourceState,
    pub effects: Vec<Effect>,
    /// The identity resolved by a join, returned to the caller only
    pub identity: Option<ClientId>,
}

/// One resource's complete coordination state
#[derive(Debug, Clone)]
pub struct ResourceState {
    resource_id: ResourceId,
    name: String,
    description: Option<String>,
    timeout: Duration,
    holder: Option<Holder>,
    waitlist: Waitlist,
    offer_expires_at: Option<DateTime<Utc>>,
    ledger: IdentityLedger,
}

impl ResourceState {
    /// Create the empty state for a freshly registered resource
    pub fn new(resource_id: impl Into<ResourceId>, spec: ResourceSpec) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: spec.name,
            description: spec.description,
            timeout: spec.timeout,
            holder: None,
            waitlist: Waitlist::new(),
            offer_expires_at: None,
            ledger: IdentityLedger::new(),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn holder(&self) -> Option<&Holder> {
        self.holder.as_ref()
    }

    pub fn waitlist(&self) -> &Waitlist {
        &self.waitlist
    }

    pub fn offer_expires_at(&self) -> Option<DateTime<Utc>> {
        self.offer_expires_at
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Apply one action, producing the next state and its effects
    pub fn apply(&self, action: Action, clock: &impl Clock) -> Result<Transition, ActionError> {
        match action {
            Action::Join {
                identity,
                display_name,
            } => self.join(identity, display_name, clock),
            Action::Release { identity } => self.release(identity, clock),
            Action::Accept { identity } => self.accept(identity),
            Action::Reject { identity } => self.drop_offered_head(identity, false, clock),
            Action::Leave { identity } => self.leave(identity, clock),
            Action::OfferTimeout => self.offer_timeout(clock),
        }
    }

    fn join(
        &self,
        claimed: Option<ClientId>,
        display_name: String,
        clock: &impl Clock,
    ) -> Result<Transition, ActionError> {
        // A claimed identity that is already the holder or already queued is
        // an idempotent re-subscription: return it, change nothing.
        if let Some(claimed) = claimed {
            let is_holder = self.holder.as_ref().is_some_and(|h| h.identity == claimed);
            if is_holder || self.waitlist.contains(claimed) {
                return Ok(Transition {
                    state: self.clone(),
                    effects: vec![],
                    identity: Some(claimed),
                });
            }
        }

        let mut next = self.clone();
        let minted = next.ledger.issue();
        let was_idle =
            next.holder.is_none() && next.offer_expires_at.is_none() && next.waitlist.is_empty();
        next.waitlist.append(minted, display_name.clone());

        let mut effects = vec![Effect::Emit(AuditEvent::JoinedWaitlist {
            identity: minted,
            display_name,
        })];
        if was_idle {
            effects.extend(next.make_offer(clock));
        }
        effects.push(Effect::Broadcast);

        Ok(Transition {
            state: next,
            effects,
            identity: Some(minted),
        })
    }

    fn release(&self, identity: ClientId, clock: &impl Clock) -> Result<Transition, ActionError> {
        if self.holder.as_ref().map(|h| h.identity) != Some(identity) {
            return Err(ActionError::IdentityMismatch {
                identity,
                required: "holder",
            });
        }

        let mut next = self.clone();
        next.holder = None;

        let mut effects = vec![Effect::Emit(AuditEvent::HolderReleased { identity })];
        if !next.waitlist.is_empty() {
            effects.extend(next.make_offer(clock));
        }
        effects.push(Effect::Broadcast);

        Ok(Transition {
            state: next,
            effects,
            identity: None,
        })
    }

    fn accept(&self, identity: ClientId) -> Result<Transition, ActionError> {
        let offered = self.offered_head_or_stale(identity)?;

        let mut next = self.clone();
        let entry = next
            .waitlist
            .remove(offered)
            .ok_or(ActionError::StaleOffer)?;
        next.holder = Some(Holder {
            identity: entry.identity,
            display_name: entry.display_name,
        });
        next.offer_expires_at = None;

        Ok(Transition {
            state: next,
            effects: vec![
                Effect::Emit(AuditEvent::OfferAccepted { identity }),
                Effect::CancelOfferTimer,
                Effect::Broadcast,
            ],
            identity: None,
        })
    }

    /// Shared by reject and offer-timeout: remove the offered head, then
    /// offer to the next entry if one exists.
    fn drop_offered_head(
        &self,
        identity: ClientId,
        timed_out: bool,
        clock: &impl Clock,
    ) -> Result<Transition, ActionError> {
        let offered = self.offered_head_or_stale(identity)?;

        let mut next = self.clone();
        next.waitlist.remove(offered);
        next.offer_expires_at = None;

        let audit = if timed_out {
            AuditEvent::OfferTimedOut { identity: offered }
        } else {
            AuditEvent::OfferRejected { identity: offered }
        };
        let mut effects = vec![Effect::Emit(audit), Effect::CancelOfferTimer];
        if !next.waitlist.is_empty() {
            effects.extend(next.make_offer(clock));
        }
        effects.push(Effect::Broadcast);

        Ok(Transition {
            state: next,
            effects,
            identity: None,
        })
    }

    fn leave(&self, identity: ClientId, clock: &impl Clock) -> Result<Transition, ActionError> {
        if !self.waitlist.contains(identity) {
            return Err(ActionError::IdentityMismatch {
                identity,
                required: "queue member",
            });
        }

        let mut next = self.clone();
        let removed = next.waitlist.remove(identity);
        let was_offered = removed.is_some_and(|e| e.offered);

        let mut effects = vec![Effect::Emit(AuditEvent::LeftWaitlist { identity })];
        if was_offered {
            next.offer_expires_at = None;
            effects.push(Effect::CancelOfferTimer);
            if !next.waitlist.is_empty() {
                effects.extend(next.make_offer(clock));
            }
        }
        effects.push(Effect::Broadcast);

        Ok(Transition {
            state: next,
            effects,
            identity: None,
        })
    }

    /// Idempotent: a timeout racing a just-processed accept is a no-op.
    fn offer_timeout(&self, clock: &impl Clock) -> Result<Transition, ActionError> {
        let Some(offered) = self.waitlist.offered_entry() else {
            return Ok(Transition {
                state: self.clone(),
                effects: vec![],
                identity: None,
            });
        };
        self.drop_offered_head(offered.identity, true, clock)
    }

    /// Only ever invoked with a non-empty waitlist; marks the head offered,
    /// stamps the expiry, and requests the countdown.
    fn make_offer(&mut self, clock: &impl Clock) -> Vec<Effect> {
        let Some(identity) = self.waitlist.mark_head_offered() else {
            return vec![];
        };
        let expires_at = clock.now_utc()
            + chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let deadline = clock.now() + self.timeout;
        self.offer_expires_at = Some(expires_at);

        vec![
            Effect::Emit(AuditEvent::OfferExtended {
                identity,
                expires_at,
            }),
            Effect::ArmOfferTimer {
                deadline,
                expires_at,
            },
        ]
    }

    /// Precondition for accept/reject: `identity` must hold the outstanding
    /// offer. A client no longer queued (its offer expired or was already
    /// resolved) gets `StaleOffer`, which callers treat as a silent no-op; a
    /// client that is queued but was never offered gets a mismatch.
    fn offered_head_or_stale(&self, identity: ClientId) -> Result<ClientId, ActionError> {
        match self.waitlist.offered_entry() {
            Some(entry) if entry.identity == identity => Ok(identity),
            _ if !self.waitlist.contains(identity) => Err(ActionError::StaleOffer),
            _ => Err(ActionError::IdentityMismatch {
                identity,
                required: "offered head",
            }),
        }
    }

    /// Build the broadcastable view of this state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            resource_id: self.resource_id.clone(),
            name: self.name.clone(),
            timeout_seconds: self.timeout.as_secs(),
            holder: self.holder.as_ref().map(|h| HolderInfo {
                user_id: h.identity,
                display_name: h.display_name.clone(),
            }),
            queue: self
                .waitlist
                .entries()
                .iter()
                .map(|e| WaiterInfo {
                    user_id: e.identity,
                    display_name: e.display_name.clone(),
                    is_offered: e.offered,
                })
                .collect(),
            offer_expires_at: self.offer_expires_at,
        }
    }

    /// Check the structural invariants; `None` means the state is sound
    pub fn invariant_violation(&self) -> Option<String> {
        let offered_count = self
            .waitlist
            .entries()
            .iter()
            .filter(|e| e.offered)
            .count();
        if offered_count > 1 {
            return Some(format!("{} entries marked offered", offered_count));
        }
        if offered_count == 1 {
            if self.holder.is_some() {
                return Some("offered entry coexists with a holder".into());
            }
            if !self.waitlist.entries()[0].offered {
                return Some("offered entry is not at position 0".into());
            }
        }
        if self.offer_expires_at.is_some() != (offered_count == 1) {
            return Some("offerExpiresAt out of sync with offered entry".into());
        }
        if let Some(holder) = &self.holder {
            if self.waitlist.contains(holder.identity) {
                return Some(format!("holder {} also queued", holder.identity));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for entry in self.waitlist.entries() {
            if !seen.insert(entry.identity) {
                return Some(format!("identity {} queued twice", entry.identity));
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
