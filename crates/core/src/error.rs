// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for client actions
//!
//! Every kind is handled locally and never corrupts state. Rejections go to
//! the originating caller only, never to the broadcast channel. `StaleOffer`
//! is special: the caller sees a plain success and reconciles from the next
//! snapshot.

use crate::ident::ClientId;
use thiserror::Error;

/// Why an action was not applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("identity {identity} is not the {required}")]
    IdentityMismatch {
        identity: ClientId,
        required: &'static str,
    },

    #[error("offer already expired or resolved")]
    StaleOffer,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ActionError {
    /// Stable wire name for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::UnknownResource(_) => "unknown_resource",
            ActionError::IdentityMismatch { .. } => "identity_mismatch",
            ActionError::StaleOffer => "stale_offer",
            ActionError::MalformedPayload(_) => "malformed_payload",
        }
    }
}
