// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::gateway::Gateway;
use crate::registry::Registry;

/// Idle resources are evicted after this long without activity or subscribers
const DEFAULT_IDLE_EVICT: Duration = Duration::from_secs(300);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Idle eviction window for resources
    pub idle_evict_after: Duration,
}

impl Config {
    /// Build config from the environment
    pub fn from_env() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        let socket_dir = socket_dir();

        Ok(Self {
            socket_path: socket_dir.join("turnstiled.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            idle_evict_after: idle_evict_after(),
        })
    }
}

/// Shared handle to the running daemon's services
#[derive(Clone)]
pub struct Daemon {
    pub registry: Registry,
    pub gateway: Gateway,
    pub start_time: Instant,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Daemon {
    pub fn new(idle_evict_after: Duration) -> Self {
        let gateway = Gateway::new();
        let registry = Registry::new(gateway.clone(), idle_evict_after);
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            gateway,
            start_time: Instant::now(),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Flip the shutdown flag; `serve` loops exit on the next poll
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Everything `startup` produced; the lock file must outlive the server loop
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    pub lock_file: File,
    pub listener: UnixListener,
    pub daemon: Daemon,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            // Clean up any resources created before failure
            cleanup(config);
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state and socket directories
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents races
    let lock_file = File::create(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file
    use std::io::Write;
    let mut lock_file = lock_file;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Reborrow as immutable

    // 3. Remove stale socket and bind (only after the lock is ours)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let daemon = Daemon::new(config.idle_evict_after);

    info!(
        "Daemon started, listening on {}",
        config.socket_path.display()
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        daemon,
    })
}

/// Remove the socket and PID file; used on shutdown and startup failure
pub fn cleanup(config: &Config) {
    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!("Failed to remove socket file: {}", e);
        }
    }
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// State directory: XDG_STATE_HOME or ~/.local/state
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("turnstile"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/turnstile"))
}

/// Socket directory
///
/// Uses /tmp/turnstile by default to keep paths short (macOS SUN_LEN = 104).
/// Can be overridden with TURNSTILE_SOCKET_DIR for testing.
fn socket_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TURNSTILE_SOCKET_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("/tmp/turnstile")
}

fn idle_evict_after() -> Duration {
    std::env::var("TURNSTILE_IDLE_EVICT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_IDLE_EVICT)
}
