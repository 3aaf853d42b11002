//! Shared helpers for the behavioral specs.
//!
//! `DaemonFixture` launches turnstiled against an isolated temp directory;
//! `Session` is a synchronous protocol client over the daemon's socket.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub use turnstile_core::{ClientId, Snapshot};
pub use turnstile_daemon::protocol::{Request, Response, ServerMessage};

/// Upper bound for condition polling in specs
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

/// Poll `check` until it returns true or the timeout elapses
pub fn wait_for(max_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// A daemon process running against an isolated temp directory
pub struct DaemonFixture {
    child: Child,
    temp: TempDir,
}

impl DaemonFixture {
    /// Launch the daemon and wait for its READY marker
    pub fn start() -> Self {
        let temp = tempfile::tempdir().expect("create tempdir");
        let child = launch(temp.path());
        Self { child, temp }
    }

    /// Build the daemon command with this fixture's isolated environment
    pub fn command(dir: &Path) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("turnstiled"));
        cmd.env("HOME", dir)
            .env("XDG_STATE_HOME", dir.join("state"))
            .env("TURNSTILE_SOCKET_DIR", dir.join("sock"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    pub fn dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.temp.path().join("sock/turnstiled.sock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.temp.path().join("state/turnstile/daemon.log")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.temp.path().join("state/turnstile/daemon.pid")
    }

    pub fn connect(&self) -> Session {
        Session::connect(&self.socket_path())
    }

    /// Request shutdown over IPC and wait for the process to exit
    pub fn stop(&mut self) {
        let mut session = self.connect();
        let response = session.request(&Request::Shutdown);
        assert_eq!(response, Response::ShuttingDown);

        assert!(
            wait_for(SPEC_WAIT_MAX_MS, || matches!(
                self.child.try_wait(),
                Ok(Some(_))
            )),
            "daemon did not exit after shutdown request"
        );
    }

    /// True once the daemon process has exited
    pub fn exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Launch a second daemon in the same directory; returns its exit status
    pub fn launch_rival(&self) -> std::process::Output {
        Self::command(self.dir())
            .output()
            .expect("launch second daemon")
    }

    /// Restart the daemon in the same directory (after `stop`)
    pub fn relaunch(&mut self) {
        self.child = launch(self.temp.path());
    }
}

impl Drop for DaemonFixture {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn launch(dir: &Path) -> Child {
    let mut child = DaemonFixture::command(dir)
        .spawn()
        .expect("spawn turnstiled");

    let stdout = child.stdout.take().expect("stdout piped");
    let mut lines = BufReader::new(stdout).lines();
    match lines.next() {
        Some(Ok(line)) if line.trim() == "READY" => child,
        other => {
            let _ = child.kill();
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            panic!("daemon did not report READY (got {:?}): {}", other, stderr);
        }
    }
}

/// Synchronous protocol client for one connection
pub struct Session {
    stream: UnixStream,
    /// State updates received while waiting for a reply
    updates: VecDeque<Snapshot>,
}

impl Session {
    pub fn connect(socket_path: &Path) -> Self {
        let deadline = Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
        loop {
            match UnixStream::connect(socket_path) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(Duration::from_millis(SPEC_WAIT_MAX_MS)))
                        .expect("set read timeout");
                    return Self {
                        stream,
                        updates: VecDeque::new(),
                    };
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => panic!("could not connect to {}: {}", socket_path.display(), e),
            }
        }
    }

    pub fn send(&mut self, request: &Request) {
        let body = serde_json::to_vec(request).expect("encode request");
        self.send_raw(&body);
    }

    /// Send a frame with an arbitrary body (for malformed-input specs)
    pub fn send_raw(&mut self, body: &[u8]) {
        let len = body.len() as u32;
        self.stream
            .write_all(&len.to_be_bytes())
            .expect("write length");
        self.stream.write_all(body).expect("write body");
    }

    /// Send a request and wait for its reply, buffering state updates
    pub fn request(&mut self, request: &Request) -> Response {
        self.send(request);
        loop {
            match self.recv() {
                ServerMessage::Reply { response } => return response,
                ServerMessage::StateUpdate { state } => self.updates.push_back(state),
            }
        }
    }

    /// Next state update satisfying `pred`, consuming updates before it
    pub fn update_where(&mut self, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
        while let Some(state) = self.updates.pop_front() {
            if pred(&state) {
                return state;
            }
        }
        loop {
            match self.recv() {
                ServerMessage::StateUpdate { state } if pred(&state) => return state,
                ServerMessage::StateUpdate { .. } => continue,
                ServerMessage::Reply { response } => {
                    panic!("unexpected reply while waiting for update: {:?}", response)
                }
            }
        }
    }

    fn recv(&mut self) -> ServerMessage {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .expect("read frame length");
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).expect("read frame body");
        serde_json::from_slice(&body).expect("decode server message")
    }
}

/// Create a resource and return its id
pub fn create_resource(session: &mut Session, name: &str, timeout_seconds: u64) -> String {
    match session.request(&Request::CreateResource {
        name: name.to_string(),
        description: None,
        timeout_seconds,
    }) {
        Response::ResourceCreated { resource_id } => resource_id,
        other => panic!("expected ResourceCreated, got {:?}", other),
    }
}

/// Join the waitlist and return the issued identity
pub fn join_queue(session: &mut Session, resource_id: &str, name: &str) -> ClientId {
    match session.request(&Request::JoinQueue {
        resource_id: resource_id.to_string(),
        display_name: name.to_string(),
        identity: None,
    }) {
        Response::Joined { identity, .. } => identity,
        other => panic!("expected Joined, got {:?}", other),
    }
}
