// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource registry and per-resource coordinator tasks.
//!
//! Each resource is owned by one spawned task that applies actions strictly
//! in arrival order: client actions, the offer timer, and idle eviction all
//! pass through the same `select!` loop, so no transition ever races another
//! for the same resource. The registry maps resource ids to command handles
//! and prunes handles whose task has exited.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use turnstile_core::{
    Action, ActionError, AuditEvent, ClientId, Clock, Effect, IdGen, OfferTimer, ResourceId,
    ResourceSpec, ResourceState, Snapshot, SystemClock, UuidIdGen,
};

use crate::gateway::Gateway;

/// Command channel depth per resource
const COMMAND_CAPACITY: usize = 64;

/// What an accepted action returns to the caller
#[derive(Debug)]
pub struct Applied {
    /// The identity resolved by a join; absent for other actions
    pub identity: Option<ClientId>,
}

enum Command {
    Act {
        action: Action,
        reply: oneshot::Sender<Result<Applied, ActionError>>,
    },
    Inspect {
        reply: oneshot::Sender<Snapshot>,
    },
}

#[derive(Clone)]
struct ResourceHandle {
    commands: mpsc::Sender<Command>,
}

/// Owns the resource map and spawns coordinator tasks
#[derive(Clone)]
pub struct Registry<C: Clock = SystemClock, I: IdGen = UuidIdGen> {
    handles: Arc<RwLock<HashMap<ResourceId, ResourceHandle>>>,
    gateway: Gateway,
    clock: C,
    ids: I,
    idle_evict_after: Duration,
}

impl Registry<SystemClock, UuidIdGen> {
    pub fn new(gateway: Gateway, idle_evict_after: Duration) -> Self {
        Self::with_deps(gateway, SystemClock, UuidIdGen, idle_evict_after)
    }
}

impl<C: Clock, I: IdGen> Registry<C, I> {
    pub fn with_deps(gateway: Gateway, clock: C, ids: I, idle_evict_after: Duration) -> Self {
        Self {
            handles: Arc::new(RwLock::new(HashMap::new())),
            gateway,
            clock,
            ids,
            idle_evict_after,
        }
    }

    /// Register a resource and spawn its coordinator task
    pub fn create(&self, spec: ResourceSpec) -> ResourceId {
        let resource_id = self.ids.next();
        let state = ResourceState::new(resource_id.clone(), spec);
        info!(
            resource_id = %resource_id,
            name = state.name(),
            description = state.description().unwrap_or(""),
            "resource registered"
        );

        self.gateway.register(&resource_id);
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(run_coordinator(
            state,
            rx,
            self.gateway.clone(),
            self.clock.clone(),
            self.idle_evict_after,
        ));

        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        handles.insert(resource_id.clone(), ResourceHandle { commands: tx });
        resource_id
    }

    /// Apply one action to a resource
    pub async fn act(
        &self,
        resource_id: &str,
        action: Action,
    ) -> Result<Applied, ActionError> {
        let handle = self.resolve(resource_id)?;
        let (reply, rx) = oneshot::channel();
        if handle
            .commands
            .send(Command::Act { action, reply })
            .await
            .is_err()
        {
            self.prune(resource_id);
            return Err(ActionError::UnknownResource(resource_id.to_string()));
        }
        rx.await
            .map_err(|_| ActionError::UnknownResource(resource_id.to_string()))?
    }

    /// Current snapshot of a resource, via its owning task
    pub async fn inspect(&self, resource_id: &str) -> Result<Snapshot, ActionError> {
        let handle = self.resolve(resource_id)?;
        let (reply, rx) = oneshot::channel();
        if handle
            .commands
            .send(Command::Inspect { reply })
            .await
            .is_err()
        {
            self.prune(resource_id);
            return Err(ActionError::UnknownResource(resource_id.to_string()));
        }
        rx.await
            .map_err(|_| ActionError::UnknownResource(resource_id.to_string()))
    }

    /// True iff the resource exists and its task is alive
    pub fn contains(&self, resource_id: &str) -> bool {
        self.resolve(resource_id).is_ok()
    }

    pub fn resource_count(&self) -> usize {
        let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
        handles.values().filter(|h| !h.commands.is_closed()).count()
    }

    fn resolve(&self, resource_id: &str) -> Result<ResourceHandle, ActionError> {
        let handle = {
            let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
            handles.get(resource_id).cloned()
        };
        match handle {
            Some(h) if !h.commands.is_closed() => Ok(h),
            Some(_) => {
                // Task exited (idle eviction); drop the stale handle
                self.prune(resource_id);
                Err(ActionError::UnknownResource(resource_id.to_string()))
            }
            None => Err(ActionError::UnknownResource(resource_id.to_string())),
        }
    }

    fn prune(&self, resource_id: &str) {
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        handles.remove(resource_id);
    }
}

/// Single-writer loop owning one resource's state
async fn run_coordinator<C: Clock>(
    mut state: ResourceState,
    mut commands: mpsc::Receiver<Command>,
    gateway: Gateway,
    clock: C,
    idle_evict_after: Duration,
) {
    let mut timer = OfferTimer::new();
    let mut idle_since = Instant::now();

    loop {
        let offer_sleep = timer
            .deadline()
            .map(Instant::from_std)
            .unwrap_or_else(Instant::now);
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(Command::Act { action, reply }) => {
                        let result = apply_action(&mut state, action, &clock, &gateway, &mut timer);
                        let _ = reply.send(result);
                        idle_since = Instant::now();
                    }
                    Some(Command::Inspect { reply }) => {
                        let _ = reply.send(state.snapshot());
                    }
                    None => break,
                }
            }

            _ = tokio::time::sleep_until(offer_sleep), if timer.is_armed() => {
                // fire() stays armed on a spurious early wake
                if timer.fire(clock.now()) {
                    if let Err(e) =
                        apply_action(&mut state, Action::OfferTimeout, &clock, &gateway, &mut timer)
                    {
                        warn!(resource_id = %state.resource_id(), error = %e, "offer timeout not applied");
                    }
                    idle_since = Instant::now();
                }
            }

            _ = tokio::time::sleep_until(idle_since + idle_evict_after),
                if state.holder().is_none() && state.waitlist().is_empty() => {
                if gateway.subscriber_count(state.resource_id()) == 0 {
                    info!(resource_id = %state.resource_id(), "evicting idle resource");
                    break;
                }
                // Subscribers still attached; re-check after another idle period
                idle_since = Instant::now();
            }
        }
    }

    gateway.remove(state.resource_id());
}

/// Apply one action and execute its effects
fn apply_action<C: Clock>(
    state: &mut ResourceState,
    action: Action,
    clock: &C,
    gateway: &Gateway,
    timer: &mut OfferTimer,
) -> Result<Applied, ActionError> {
    let transition = state.apply(action, clock)?;
    *state = transition.state;

    for effect in transition.effects {
        match effect {
            Effect::Broadcast => gateway.publish(state.snapshot()),
            Effect::ArmOfferTimer { deadline, .. } => timer.arm(deadline),
            Effect::CancelOfferTimer => timer.cancel(),
            Effect::Emit(event) => audit(state.resource_id(), &event),
        }
    }

    Ok(Applied {
        identity: transition.identity,
    })
}

fn audit(resource_id: &str, event: &AuditEvent) {
    match event {
        AuditEvent::JoinedWaitlist {
            identity,
            display_name,
        } => {
            info!(resource_id, identity = %identity, display_name, "joined waitlist");
        }
        AuditEvent::LeftWaitlist { identity } => {
            info!(resource_id, identity = %identity, "left waitlist");
        }
        AuditEvent::OfferExtended {
            identity,
            expires_at,
        } => {
            info!(resource_id, identity = %identity, expires_at = %expires_at, "offer extended");
        }
        AuditEvent::OfferAccepted { identity } => {
            info!(resource_id, identity = %identity, "offer accepted");
        }
        AuditEvent::OfferRejected { identity } => {
            info!(resource_id, identity = %identity, "offer rejected");
        }
        AuditEvent::OfferTimedOut { identity } => {
            info!(resource_id, identity = %identity, "offer timed out");
        }
        AuditEvent::HolderReleased { identity } => {
            debug!(resource_id, identity = %identity, "holder released");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
