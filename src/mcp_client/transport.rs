//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with one endpoint child process:
//! - Writing JSON-RPC requests and notifications to stdin
//! - Reading JSON-RPC responses from stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! A transport belongs to exactly one session, so it takes `&mut self`
//! instead of locking, and request ids are counted per transport.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};

use super::errors::GatewayError;
use super::types::{
    error_codes, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse,
};

/// Low-level transport failures. Sessions turn these into `GatewayError`s.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint closed its stdout (usually: the process exited).
    #[error("server stdout closed (process may have exited)")]
    Closed,

    /// Reading or writing the pipes failed.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Encode(#[from] serde_json::Error),

    /// stdin was already closed by `close_input`.
    #[error("server stdin already closed")]
    InputClosed,
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    endpoint: String,
    writer: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    line_buf: Vec<u8>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(endpoint: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            writer: Some(stdin),
            reader: BufReader::new(stdout),
            next_id: 1,
            line_buf: Vec::new(),
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Lines that are not JSON-RPC messages are treated as server log output
    /// and skipped. Requests the server sends us are refused with
    /// `method not found` so the server does not wait on us forever.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id;
        self.next_id += 1;

        let req = JsonRpcRequest::new(id, method, params);
        self.send(&req).await?;

        loop {
            self.line_buf.clear();
            let bytes_read = self
                .reader
                .read_until(b'\n', &mut self.line_buf)
                .await
                .map_err(|source| TransportError::Io {
                    context: "failed to read from stdout",
                    source,
                })?;

            if bytes_read == 0 {
                return Err(TransportError::Closed);
            }

            let Ok(line) = std::str::from_utf8(&self.line_buf) else {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    line = %String::from_utf8_lossy(&self.line_buf).trim(),
                    "skipping non-UTF-8 stdout line"
                );
                continue;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
                tracing::debug!(endpoint = %self.endpoint, line = %trimmed, "skipping non-JSON stdout line");
                continue;
            };

            match IncomingMessage::classify(value) {
                Some(IncomingMessage::Response(resp)) if resp.id.as_u64() == Some(id) => {
                    return Ok(resp);
                }
                Some(IncomingMessage::Response(resp)) => {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        expected = id,
                        got = %resp.id,
                        "skipping response for another request id"
                    );
                }
                Some(IncomingMessage::Request { id: server_id, method }) => {
                    tracing::debug!(endpoint = %self.endpoint, method = %method, "refusing server-initiated request");
                    self.refuse(server_id, &method).await?;
                }
                Some(IncomingMessage::Notification { method }) => {
                    tracing::debug!(endpoint = %self.endpoint, method = %method, "ignoring server notification");
                }
                None => {
                    tracing::debug!(endpoint = %self.endpoint, "skipping non-JSON-RPC stdout line");
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        self.send(&JsonRpcNotification::new(method, params)).await
    }

    /// Close the child's stdin, signalling end of input.
    pub fn close_input(&mut self) {
        self.writer.take();
    }

    /// Answer a server-initiated request with `method not found`.
    async fn refuse(&mut self, id: serde_json::Value, method: &str) -> Result<(), TransportError> {
        let error = JsonRpcError {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("method '{method}' is not supported by this client"),
            data: None,
        };
        let reply = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error,
        });
        self.send(&reply).await
    }

    async fn send<T: serde::Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::InputClosed)?;
        write_line(writer, message).await
    }
}

/// Serialize `message` as one line of JSON and flush it.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');

    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|source| TransportError::Io {
            context: "failed to write to stdin",
            source,
        })?;
    writer.flush().await.map_err(|source| TransportError::Io {
        context: "failed to flush stdin",
        source,
    })
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `GatewayError`.
pub fn extract_result(
    endpoint: &str,
    response: JsonRpcResponse,
) -> Result<serde_json::Value, GatewayError> {
    if let Some(err) = response.error {
        return Err(GatewayError::EndpointError {
            endpoint: endpoint.to_string(),
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or_else(|| GatewayError::ProtocolError {
        endpoint: endpoint.to_string(),
        reason: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
