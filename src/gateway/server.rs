//! Upstream stdio server.
//!
//! Reads one JSON-RPC message per line. `tools/call` requests each run on
//! their own task so a slow endpoint never blocks the others; every response
//! goes through a single writer task. When the input closes, in-flight calls
//! are allowed to finish and their responses are flushed before returning.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::Gateway;
use super::handler::{self, rpc_error, UpstreamResponse};
use crate::mcp_client::types::error_codes;

/// Serve the gateway on the process's stdin/stdout.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> std::io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(gateway, stdin, tokio::io::stdout()).await
}

/// Serve the gateway over an arbitrary line-oriented stream pair.
///
/// Returns once `reader` reaches EOF and every in-flight call has answered.
pub async fn serve<R, W>(gateway: Arc<Gateway>, mut reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<UpstreamResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let message = match parse_line(&buf) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(reason) => {
                tracing::warn!(error = %reason, "unparseable upstream message");
                let _ = tx.send(UpstreamResponse::failure(
                    Value::Null,
                    rpc_error(error_codes::PARSE_ERROR, format!("parse error: {reason}")),
                ));
                continue;
            }
        };

        let method = message.get("method").and_then(Value::as_str).map(str::to_owned);
        let id = message.get("id").filter(|id| !id.is_null()).cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) if method == "tools/call" => {
                in_flight.retain(|_, handle| !handle.is_finished());

                let key = id.to_string();
                if in_flight.contains_key(&key) {
                    tracing::warn!(id = %id, "request id reused while still in flight");
                    let _ = tx.send(UpstreamResponse::failure(
                        id,
                        rpc_error(
                            error_codes::INVALID_REQUEST,
                            "request id is already in use by an in-flight call",
                        ),
                    ));
                    continue;
                }

                let gateway = Arc::clone(&gateway);
                let tx = tx.clone();
                let handle = tokio::spawn(async move {
                    let result = handler::handle(&gateway, &method, params).await;
                    let _ = tx.send(UpstreamResponse::from_result(id, result));
                });
                in_flight.insert(key, handle);
            }
            (Some(method), Some(id)) => {
                tracing::debug!(method = %method, "upstream request");
                let result = handler::handle(&gateway, &method, params).await;
                let _ = tx.send(UpstreamResponse::from_result(id, result));
            }
            (Some(method), None) => {
                if method == "notifications/cancelled" {
                    cancel(&mut in_flight, &params);
                } else {
                    tracing::debug!(method = %method, "upstream notification");
                }
            }
            (None, Some(id)) => {
                // Responses to server-initiated requests; we never send any.
                tracing::debug!(id = %id, "ignoring upstream response");
            }
            (None, None) => {
                let _ = tx.send(UpstreamResponse::failure(
                    Value::Null,
                    rpc_error(error_codes::INVALID_REQUEST, "invalid request"),
                ));
            }
        }
    }

    tracing::info!(
        in_flight = in_flight.values().filter(|h| !h.is_finished()).count(),
        "upstream input closed"
    );
    join_all(in_flight.into_values()).await;

    drop(tx);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}

/// Decode one raw input line. Blank lines yield `None`; invalid UTF-8 and
/// invalid JSON are both parse errors.
fn parse_line(raw: &[u8]) -> Result<Option<Value>, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("invalid UTF-8: {e}"))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text).map(Some).map_err(|e| e.to_string())
}

/// Abort the call named by `params.requestId`. Its session is dropped,
/// which kills the endpoint process, and no response is sent.
fn cancel(in_flight: &mut HashMap<String, JoinHandle<()>>, params: &Value) {
    let Some(request_id) = params.get("requestId") else {
        return;
    };
    match in_flight.remove(&request_id.to_string()) {
        Some(handle) => {
            tracing::info!(request_id = %request_id, "cancelling in-flight call");
            handle.abort();
        }
        None => tracing::debug!(request_id = %request_id, "cancel for unknown request"),
    }
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<UpstreamResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

// ─── Tests ───────────────────────────────────────────────────────────────────
