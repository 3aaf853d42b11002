// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.
//!
//! Each connection gets a reader loop, a dedicated writer task, and one
//! forwarder task per subscribed resource. Replies and state updates share
//! the writer so frames never interleave.

use std::collections::HashMap;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use turnstile_core::{Action, ActionError, ResourceId, ResourceSpec};

use crate::gateway::Gateway;
use crate::lifecycle::Daemon;
use crate::protocol::{
    self, ProtocolError, Request, Response, ServerMessage, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Accept connections until shutdown is requested
pub async fn serve(listener: UnixListener, daemon: Daemon) -> Result<(), ServerError> {
    let mut shutdown = daemon.subscribe_shutdown();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let daemon = daemon.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(daemon, stream).await {
                                debug!("connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            _ = shutdown.changed() => break,
        }
    }

    Ok(())
}

/// Handle a single client connection until it closes
pub async fn handle_connection(daemon: Daemon, stream: UnixStream) -> Result<(), ServerError> {
    let (mut reader, writer) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer_task = tokio::spawn(write_outbound(writer, outbound_rx));

    let mut session = Session {
        daemon,
        outbound,
        forwarders: HashMap::new(),
    };

    let result = loop {
        let request = match protocol::read_request(&mut reader).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("Client disconnected");
                break Ok(());
            }
            Err(ProtocolError::Serde(e)) => {
                // Unparseable frame: reject it and keep the connection
                let response = Response::Rejected {
                    kind: "malformed_payload".to_string(),
                    message: e.to_string(),
                };
                if session
                    .outbound
                    .send(ServerMessage::Reply { response })
                    .is_err()
                {
                    break Ok(());
                }
                continue;
            }
            Err(e) => {
                error!("Failed to read request: {}", e);
                break Err(ServerError::Protocol(e));
            }
        };

        debug!("Received request: {:?}", request);
        let closing = matches!(request, Request::Shutdown);
        let response = session.handle_request(request).await;
        debug!("Sending response: {:?}", response);

        if session
            .outbound
            .send(ServerMessage::Reply { response })
            .is_err()
        {
            break Ok(());
        }
        if closing {
            break Ok(());
        }
    };

    for (_, forwarder) in session.forwarders.drain() {
        forwarder.abort();
    }
    drop(session);
    let _ = writer_task.await;
    result
}

/// Writer task: the only place frames are written to this connection
async fn write_outbound(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = protocol::write_server_message(&mut writer, &message, DEFAULT_TIMEOUT).await
        {
            debug!("write failed, closing connection: {}", e);
            break;
        }
    }
}

/// Per-connection state: subscriptions and the shared outbound channel
struct Session {
    daemon: Daemon,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    forwarders: HashMap<ResourceId, JoinHandle<()>>,
}

impl Session {
    async fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::Hello { version: _ } => Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            },

            Request::CreateResource {
                name,
                description,
                timeout_seconds,
            } => self.create_resource(name, description, timeout_seconds),

            Request::JoinResource { resource_id } => self.join_resource(resource_id).await,

            Request::JoinQueue {
                resource_id,
                display_name,
                identity,
            } => {
                if display_name.trim().is_empty() {
                    return rejected(&ActionError::MalformedPayload(
                        "displayName must not be empty".to_string(),
                    ));
                }
                let action = Action::Join {
                    identity,
                    display_name,
                };
                match self.daemon.registry.act(&resource_id, action).await {
                    Ok(applied) => match applied.identity {
                        Some(identity) => Response::Joined {
                            resource_id,
                            identity,
                        },
                        None => Response::Ok,
                    },
                    Err(e) => rejected(&e),
                }
            }

            Request::ReleaseResource {
                resource_id,
                identity,
            } => self.act(&resource_id, Action::Release { identity }).await,

            Request::AcceptOffer {
                resource_id,
                identity,
            } => self.act(&resource_id, Action::Accept { identity }).await,

            Request::RejectOffer {
                resource_id,
                identity,
            } => self.act(&resource_id, Action::Reject { identity }).await,

            Request::LeaveQueue {
                resource_id,
                identity,
            } => self.act(&resource_id, Action::Leave { identity }).await,

            Request::Status => {
                let uptime_secs = self.daemon.start_time.elapsed().as_secs();
                Response::Status {
                    uptime_secs,
                    resources: self.daemon.registry.resource_count(),
                    subscribers: self.daemon.gateway.total_subscribers(),
                }
            }

            Request::Shutdown => {
                self.daemon.request_shutdown();
                Response::ShuttingDown
            }
        }
    }

    fn create_resource(
        &self,
        name: String,
        description: Option<String>,
        timeout_seconds: u64,
    ) -> Response {
        if name.trim().is_empty() {
            return rejected(&ActionError::MalformedPayload(
                "name must not be empty".to_string(),
            ));
        }
        if timeout_seconds == 0 {
            return rejected(&ActionError::MalformedPayload(
                "timeoutSeconds must be at least 1".to_string(),
            ));
        }

        let resource_id = self.daemon.registry.create(ResourceSpec {
            name,
            description,
            timeout: std::time::Duration::from_secs(timeout_seconds),
        });
        Response::ResourceCreated { resource_id }
    }

    /// Subscribe this connection to a resource's state updates.
    ///
    /// The receiver is registered before the current state is read, so a
    /// transition landing in between still reaches this connection.
    /// Re-subscribing is idempotent: the latest state is re-sent and the
    /// existing forwarder is kept.
    async fn join_resource(&mut self, resource_id: String) -> Response {
        if !self.forwarders.contains_key(&resource_id) {
            let Some((latest, rx)) = self.daemon.gateway.subscribe(&resource_id) else {
                return rejected(&ActionError::UnknownResource(resource_id));
            };
            let forwarder = tokio::spawn(forward_updates(
                resource_id.clone(),
                rx,
                self.outbound.clone(),
                self.daemon.gateway.clone(),
            ));
            self.forwarders.insert(resource_id.clone(), forwarder);

            if let Some(state) = latest {
                return Response::Subscribed { state };
            }
        } else if let Some(state) = self.daemon.gateway.latest(&resource_id) {
            return Response::Subscribed { state };
        }

        // Nothing broadcast yet; ask the coordinator for the initial state
        match self.daemon.registry.inspect(&resource_id).await {
            Ok(state) => Response::Subscribed { state },
            Err(e) => rejected(&e),
        }
    }

    async fn act(&self, resource_id: &str, action: Action) -> Response {
        match self.daemon.registry.act(resource_id, action).await {
            Ok(_) => Response::Ok,
            // The offer was already resolved; the caller reconciles from the
            // next state update
            Err(ActionError::StaleOffer) => Response::Ok,
            Err(e) => rejected(&e),
        }
    }
}

fn rejected(error: &ActionError) -> Response {
    Response::Rejected {
        kind: error.kind().to_string(),
        message: error.to_string(),
    }
}

/// Forwarder task: pumps one resource's updates into the connection writer
async fn forward_updates(
    resource_id: ResourceId,
    mut rx: tokio::sync::broadcast::Receiver<turnstile_core::Snapshot>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    gateway: Gateway,
) {
    loop {
        match rx.recv().await {
            Ok(state) => {
                if outbound.send(ServerMessage::StateUpdate { state }).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                // Intermediate snapshots are disposable; resynchronize from
                // the latest one
                debug!(resource_id = %resource_id, skipped, "subscriber lagged");
                if let Some(state) = gateway.latest(&resource_id) {
                    if outbound.send(ServerMessage::StateUpdate { state }).is_err() {
                        break;
                    }
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
