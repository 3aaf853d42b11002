// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable resource snapshots broadcast after each accepted transition
//!
//! Field names are camelCase on the wire; clients render these directly.

use crate::ident::ClientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The complete observable state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub resource_id: String,
    pub name: String,
    pub timeout_seconds: u64,
    pub holder: Option<HolderInfo>,
    pub queue: Vec<WaiterInfo>,
    pub offer_expires_at: Option<DateTime<Utc>>,
}

/// The identity currently granted exclusive access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderInfo {
    pub user_id: ClientId,
    pub display_name: String,
}

/// One waitlist position as clients observe it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaiterInfo {
    pub user_id: ClientId,
    pub display_name: String,
    pub is_offered: bool,
}
