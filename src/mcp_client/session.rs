//! Endpoint sessions — one spawned process, one handshake, one exchange.
//!
//! A session drives exactly one child process through
//! `Spawning → Handshaking → Ready → Invoking → Closing → Closed`, or into
//! `Failed` from any non-terminal state. Sessions carry no timeouts of their
//! own; the lifecycle manager wraps each phase. Whatever happens, the child
//! does not outlive the session: `shutdown` and `terminate` reap it, and a
//! session dropped mid-flight kills its whole process group.

use std::collections::VecDeque;
use std::fmt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::environment::ResolvedEnv;
use super::errors::GatewayError;
use super::transport::{self, StdioTransport, TransportError};
use super::types::{
    CapabilityDescriptor, EndpointDescriptor, InitializeResult, ListToolsResult,
    MCP_PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long to wait for an exit status once the endpoint closed stdout.
const EXIT_STATUS_WAIT: Duration = Duration::from_millis(250);

/// How long to let the stderr drain catch up before reporting a failure.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

/// stderr lines kept for error context.
const STDERR_TAIL_LINES: usize = 20;

/// Upper bound on the stderr excerpt attached to an error.
const STDERR_MAX_CHARS: usize = 2000;

// ─── State ───────────────────────────────────────────────────────────────────

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawning,
    Handshaking,
    Ready,
    Invoking,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether the state machine permits `self → next`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Spawning, Handshaking)
                | (Handshaking, Ready)
                | (Ready, Invoking)
                | (Invoking, Closing)
                | (Failed, Closing)
                | (Closing, Closed)
                | (Spawning | Handshaking | Ready | Invoking, Failed)
                | (Spawning | Handshaking | Ready, Closing)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Spawning => "spawning",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Invoking => "invoking",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ─── Stderr capture ──────────────────────────────────────────────────────────

/// Last few stderr lines of an endpoint, for error messages.
#[derive(Debug, Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: String) {
        let mut lines = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn snapshot(&self) -> String {
        let lines = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let mut joined = lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if let Some((cut, _)) = joined.char_indices().nth(STDERR_MAX_CHARS) {
            joined.truncate(cut);
            joined.push_str("...(truncated)");
        }
        joined
    }
}

/// Forward an endpoint's stderr into the log, keeping the tail.
fn spawn_stderr_drain(endpoint: String, stderr: ChildStderr, tail: StderrTail) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(endpoint = %endpoint, stderr = %line, "server stderr");
            tail.push(line);
        }
    })
}

// ─── EndpointSession ─────────────────────────────────────────────────────────

/// A single-use connection to one endpoint process.
pub struct EndpointSession<'a> {
    descriptor: &'a EndpointDescriptor,
    state: SessionState,
    child: Child,
    pid: Option<u32>,
    transport: StdioTransport,
    stderr: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
}

impl<'a> EndpointSession<'a> {
    /// Launch the endpoint process.
    ///
    /// The child inherits the gateway's environment, overlaid with the
    /// descriptor's fixed variables and the resolved required ones.
    pub fn spawn(
        descriptor: &'a EndpointDescriptor,
        resolved: &ResolvedEnv,
    ) -> Result<Self, GatewayError> {
        let name = descriptor.name.as_str();

        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args)
            .envs(&descriptor.env)
            .envs(resolved)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so teardown reaches launcher grandchildren (npx → node).
        #[cfg(unix)]
        cmd.process_group(0);

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = cmd.spawn().map_err(|e| GatewayError::SpawnError {
            endpoint: name.to_string(),
            reason: describe_spawn_error(&descriptor.command, &e),
        })?;

        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(GatewayError::SpawnError {
                endpoint: name.to_string(),
                reason: "failed to capture stdio".into(),
            });
        };

        let stderr = StderrTail::default();
        let stderr_task = child
            .stderr
            .take()
            .map(|handle| spawn_stderr_drain(name.to_string(), handle, stderr.clone()));

        tracing::debug!(endpoint = name, pid, command = %descriptor.command, "spawned server process");

        Ok(Self {
            descriptor,
            state: SessionState::Spawning,
            child,
            pid,
            transport: StdioTransport::new(name, stdin, stdout),
            stderr,
            stderr_task,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// OS process id of the endpoint, if it is still known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn descriptor(&self) -> &EndpointDescriptor {
        self.descriptor
    }

    /// Perform the MCP initialization handshake.
    pub async fn handshake(&mut self) -> Result<InitializeResult, GatewayError> {
        self.advance(SessionState::Handshaking)?;

        let params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let response = match self.transport.request("initialize", Some(params)).await {
            Ok(response) => response,
            Err(e) => return Err(self.transport_failure(e).await),
        };

        let result = transport::extract_result(&self.descriptor.name, response).map_err(|e| {
            match e {
                GatewayError::EndpointError { code, message, .. } => self.protocol_error(format!(
                    "initialize rejected [{code}]: {message}"
                )),
                other => other,
            }
        })?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| self.protocol_error(format!("malformed initialize response: {e}")))?;

        if let Err(e) = self.transport.notify("notifications/initialized", None).await {
            return Err(self.transport_failure(e).await);
        }

        let server_info = init.server_info.as_ref();
        tracing::debug!(
            endpoint = %self.descriptor.name,
            pid = self.pid,
            protocol = %init.protocol_version,
            server = server_info.and_then(|s| s.name.as_deref()).unwrap_or("?"),
            version = server_info.and_then(|s| s.version.as_deref()).unwrap_or("?"),
            "handshake complete"
        );

        self.advance(SessionState::Ready)?;
        Ok(init)
    }

    /// Ask the endpoint for its capability list (`tools/list`).
    pub async fn discover(&mut self) -> Result<Vec<CapabilityDescriptor>, GatewayError> {
        let result = self.exchange("tools/list", None).await?;

        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| self.protocol_error(format!("malformed tools/list response: {e}")))?;

        Ok(list.tools)
    }

    /// Invoke one capability (`tools/call`) and return the endpoint's result verbatim.
    pub async fn invoke(
        &mut self,
        capability: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let params = serde_json::json!({
            "name": capability,
            "arguments": arguments,
        });
        let result = self.exchange("tools/call", Some(params)).await?;

        if !result.is_object() {
            return Err(self.protocol_error(format!(
                "tools/call result is not an object: {result}"
            )));
        }
        Ok(result)
    }

    /// Close stdin, give the process `grace` to exit on its own, then kill it.
    pub async fn shutdown(mut self, grace: Duration) -> Option<ExitStatus> {
        self.enter_closing();
        self.transport.close_input();

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                kill_process_group(self.pid);
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %self.descriptor.name, error = %e, "wait failed, killing server");
                self.kill().await
            }
            Err(_) => {
                tracing::debug!(
                    endpoint = %self.descriptor.name,
                    grace_ms = grace.as_millis() as u64,
                    "server did not exit after stdin closed, killing"
                );
                self.kill().await
            }
        };

        self.enter(SessionState::Closed);
        status
    }

    /// Mark the session failed and kill the process immediately.
    pub async fn terminate(mut self, error: &GatewayError) -> Option<ExitStatus> {
        tracing::debug!(
            endpoint = %self.descriptor.name,
            pid = self.pid,
            state = %self.state,
            error = %error,
            "session failed"
        );
        if self.state != SessionState::Failed && self.state.can_advance_to(SessionState::Failed) {
            self.enter(SessionState::Failed);
        }
        self.enter_closing();
        self.transport.close_input();
        let status = self.kill().await;
        self.enter(SessionState::Closed);
        status
    }

    // ─── Internals ───────────────────────────────────────────────────────

    /// Send one request from `Ready`, moving to `Invoking`.
    async fn exchange(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, GatewayError> {
        self.advance(SessionState::Invoking)?;

        let response = match self.transport.request(method, params).await {
            Ok(response) => response,
            Err(e) => return Err(self.transport_failure(e).await),
        };

        transport::extract_result(&self.descriptor.name, response)
    }

    fn advance(&mut self, next: SessionState) -> Result<(), GatewayError> {
        if !self.state.can_advance_to(next) {
            return Err(self.protocol_error(format!(
                "session cannot move from {} to {next}",
                self.state
            )));
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        tracing::trace!(endpoint = %self.descriptor.name, from = %self.state, to = %next, "session state");
        self.state = next;
    }

    fn enter_closing(&mut self) {
        if self.state != SessionState::Closing {
            self.enter(SessionState::Closing);
        }
    }

    fn protocol_error(&self, reason: String) -> GatewayError {
        GatewayError::ProtocolError {
            endpoint: self.descriptor.name.clone(),
            reason,
        }
    }

    /// Turn a transport failure into a `ProtocolError`, with the exit status
    /// and stderr tail when the endpoint went away.
    async fn transport_failure(&mut self, err: TransportError) -> GatewayError {
        let mut reason = err.to_string();

        if matches!(err, TransportError::Closed) {
            if let Ok(Ok(status)) = tokio::time::timeout(EXIT_STATUS_WAIT, self.child.wait()).await {
                reason = format!("server exited before responding ({status})");
            }
            if let Some(task) = self.stderr_task.take() {
                let _ = tokio::time::timeout(STDERR_SETTLE, task).await;
            }
        }

        let stderr = self.stderr.snapshot();
        if !stderr.is_empty() {
            reason.push_str(&format!(" | stderr: {}", stderr.trim()));
        }

        self.protocol_error(reason)
    }

    /// Kill the process group and reap the child.
    async fn kill(&mut self) -> Option<ExitStatus> {
        kill_process_group(self.pid);

        if let Ok(Some(status)) = self.child.try_wait() {
            return Some(status);
        }
        if let Err(e) = self.child.kill().await {
            tracing::warn!(endpoint = %self.descriptor.name, pid = self.pid, error = %e, "failed to kill server");
        }
        self.child.try_wait().ok().flatten()
    }
}

impl Drop for EndpointSession<'_> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            tracing::warn!(
                endpoint = %self.descriptor.name,
                pid = self.pid,
                state = %self.state,
                "session dropped before teardown, killing server"
            );
            kill_process_group(self.pid);
            let _ = self.child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// SIGKILL every process in the endpoint's group. Best-effort.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pid, error = %e, "killpg failed"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn describe_spawn_error(command: &str, err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => format!("command not found: {command}"),
        std::io::ErrorKind::PermissionDenied => format!("permission denied: {command}"),
        _ => format!("{command}: {err}"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
