// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects and audit events requested by coordinator transitions
//!
//! The state machine never touches timers, channels, or logs itself; it
//! returns effects and the owning task executes them.

use crate::ident::ClientId;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Side effects a transition asks its owner to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Broadcast the post-transition snapshot to every subscriber
    Broadcast,
    /// Arm the offer countdown, replacing any armed deadline
    ArmOfferTimer {
        deadline: Instant,
        expires_at: DateTime<Utc>,
    },
    /// Disarm the offer countdown
    CancelOfferTimer,
    /// Record an audit event
    Emit(AuditEvent),
}

/// Audit trail of accepted transitions
///
/// A timeout and a user rejection have the same state effect but are
/// distinguished here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    JoinedWaitlist {
        identity: ClientId,
        display_name: String,
    },
    LeftWaitlist {
        identity: ClientId,
    },
    OfferExtended {
        identity: ClientId,
        expires_at: DateTime<Utc>,
    },
    OfferAccepted {
        identity: ClientId,
    },
    OfferRejected {
        identity: ClientId,
    },
    OfferTimedOut {
        identity: ClientId,
    },
    HolderReleased {
        identity: ClientId,
    },
}
