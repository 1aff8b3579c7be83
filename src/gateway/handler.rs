//! Upstream MCP method dispatch.
//!
//! Maps `initialize`, `ping`, `tools/list` and `tools/call` onto the
//! [`Gateway`] operations. Gateway failures become tool results with
//! `isError: true`; only malformed requests become JSON-RPC errors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::engine::Gateway;
use super::format;
use crate::mcp_client::types::{error_codes, JsonRpcError, SUPPORTED_PROTOCOL_VERSIONS};
use crate::mcp_client::GatewayError;

// ─── Constants ───────────────────────────────────────────────────────────────

pub const LIST_TOOL: &str = "list_available_mcps";
pub const LOAD_TOOL: &str = "load_mcp_tools";
pub const CALL_TOOL: &str = "call_mcp_tool";

const INSTRUCTIONS: &str = "Call list_available_mcps to see which MCP servers can be loaded, \
load_mcp_tools to see one server's tools, then call_mcp_tool to run a tool. \
Servers are started on demand and stopped after every call.";

// ─── Upstream Messages ───────────────────────────────────────────────────────

/// Response written to the upstream client.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl UpstreamResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: Value, result: Result<Value, JsonRpcError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::failure(id, error),
        }
    }
}

pub fn rpc_error(code: i64, message: impl Into<String>) -> JsonRpcError {
    JsonRpcError {
        code,
        message: message.into(),
        data: None,
    }
}

fn invalid_params(message: impl Into<String>) -> JsonRpcError {
    rpc_error(error_codes::INVALID_PARAMS, message)
}

// ─── Tool Call Parameters ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LoadArgs {
    mcp_name: String,
}

#[derive(Debug, Deserialize)]
struct CallArgs {
    mcp_name: String,
    tool_name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Option<Value>) -> Result<T, JsonRpcError> {
    let arguments = match arguments {
        None | Some(Value::Null) => json!({}),
        Some(value) => value,
    };
    serde_json::from_value(arguments)
        .map_err(|e| invalid_params(format!("invalid arguments for {tool}: {e}")))
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Handle one upstream request and produce its `result` or error.
pub async fn handle(gateway: &Gateway, method: &str, params: Value) -> Result<Value, JsonRpcError> {
    match method {
        "initialize" => Ok(initialize_result(&params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => call(gateway, params).await,
        other => Err(rpc_error(
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

/// `initialize` result: echo the client's protocol version when supported,
/// otherwise offer the newest one we speak.
pub fn initialize_result(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": INSTRUCTIONS,
    })
}

/// The three gateway tools advertised upstream.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": LIST_TOOL,
            "description": "List all MCP servers this gateway can load, with descriptions \
                            and any missing environment variables. Call this first.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": LOAD_TOOL,
            "description": "Start an MCP server and list the tools it provides.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "mcp_name": {
                        "type": "string",
                        "description": "Server name from list_available_mcps"
                    }
                },
                "required": ["mcp_name"]
            }
        },
        {
            "name": CALL_TOOL,
            "description": "Start an MCP server, call one of its tools, and return the result.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "mcp_name": {
                        "type": "string",
                        "description": "Server name from list_available_mcps"
                    },
                    "tool_name": {
                        "type": "string",
                        "description": "Tool name from load_mcp_tools"
                    },
                    "arguments": {
                        "type": "object",
                        "description": "Arguments for the tool"
                    }
                },
                "required": ["mcp_name", "tool_name"]
            }
        }
    ])
}

async fn call(gateway: &Gateway, params: Value) -> Result<Value, JsonRpcError> {
    let params: ToolCallParams = serde_json::from_value(params)
        .map_err(|e| invalid_params(format!("invalid tools/call params: {e}")))?;

    match params.name.as_str() {
        LIST_TOOL => Ok(list_result(gateway)),
        LOAD_TOOL => {
            let args: LoadArgs = parse_args(LOAD_TOOL, params.arguments)?;
            tracing::info!(endpoint = %args.mcp_name, "loading tools");
            Ok(match gateway.load_tools(&args.mcp_name).await {
                Ok(tools) => text_result(
                    format::tool_listing(&args.mcp_name, &tools),
                    json!({ "mcp_name": args.mcp_name, "tools": tools }),
                ),
                Err(e) => error_result(&e),
            })
        }
        CALL_TOOL => {
            let args: CallArgs = parse_args(CALL_TOOL, params.arguments)?;
            if let Some(arguments) = &args.arguments {
                if !arguments.is_object() && !arguments.is_null() {
                    return Err(invalid_params("'arguments' must be an object"));
                }
            }
            tracing::info!(
                endpoint = %args.mcp_name,
                tool = %args.tool_name,
                "calling tool"
            );
            Ok(
                match gateway
                    .call_tool(&args.mcp_name, &args.tool_name, args.arguments)
                    .await
                {
                    Ok(payload) => payload,
                    Err(e) => error_result(&e),
                },
            )
        }
        other => Err(invalid_params(format!("unknown tool: {other}"))),
    }
}

fn list_result(gateway: &Gateway) -> Value {
    let entries: Vec<_> = gateway
        .list_available()
        .into_iter()
        .map(|summary| {
            let missing = gateway.missing_variables(&summary.name);
            (summary, missing)
        })
        .collect();

    let servers: Vec<_> = entries.iter().map(|(summary, _)| summary).collect();
    text_result(
        format::endpoint_listing(&entries),
        json!({ "servers": servers }),
    )
}

fn text_result(text: String, structured: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
        "isError": false,
    })
}

fn error_result(error: &GatewayError) -> Value {
    json!({
        "content": [{ "type": "text", "text": format::error_text(error) }],
        "structuredContent": { "error": error.to_json() },
        "isError": true,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
