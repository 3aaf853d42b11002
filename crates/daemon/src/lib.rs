// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! turnstile-daemon: the Turnstile coordination daemon
//!
//! Owns resource coordinator tasks, the broadcast gateway, and the Unix
//! socket server clients connect to.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod gateway;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod server;

pub use gateway::Gateway;
pub use lifecycle::{cleanup, startup, Config, Daemon, DaemonState, LifecycleError};
pub use registry::{Applied, Registry};
pub use server::{handle_connection, serve, ServerError};
