// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile-core: Core library for the Turnstile access coordinator
//!
//! This crate provides:
//! - The pure per-resource coordinator state machine
//! - FIFO waitlists, offer timers, and identity ledgers
//! - Effect-based orchestration (the daemon executes the effects)
//! - Wire-shaped resource snapshots

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod id;

// State machine building blocks (order matters for dependencies)
pub mod ident;
pub mod waitlist;
pub mod timer;
pub mod effect;
pub mod error;
pub mod snapshot;
pub mod coordinator;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use coordinator::{Action, Holder, ResourceId, ResourceSpec, ResourceState, Transition};
pub use effect::{AuditEvent, Effect};
pub use error::ActionError;
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use ident::{ClientId, IdentityLedger};
pub use snapshot::{HolderInfo, Snapshot, WaiterInfo};
pub use timer::OfferTimer;
pub use waitlist::{QueueEntry, Waitlist};
