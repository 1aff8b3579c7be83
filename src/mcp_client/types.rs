//! Shared types for the MCP client side of the gateway.
//!
//! JSON-RPC 2.0 message types, MCP protocol structures, and the descriptor
//! types the registry and sessions work with.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One line read from an endpoint's stdout, classified by shape.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A response to one of our requests.
    Response(JsonRpcResponse),
    /// A request initiated by the endpoint (sampling, roots, ...).
    Request {
        id: serde_json::Value,
        method: String,
    },
    /// A notification from the endpoint (logging, progress, ...).
    Notification { method: String },
}

impl IncomingMessage {
    /// Classify a parsed JSON value. Returns `None` for anything that is not
    /// a JSON-RPC message.
    pub fn classify(value: serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        match (obj.get("method").and_then(|m| m.as_str()), obj.get("id")) {
            (Some(method), Some(id)) if !id.is_null() => Some(IncomingMessage::Request {
                id: id.clone(),
                method: method.to_string(),
            }),
            (Some(method), _) => Some(IncomingMessage::Notification {
                method: method.to_string(),
            }),
            (None, Some(_)) => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Response),
            (None, None) => None,
        }
    }
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Protocol version the gateway offers to endpoints.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the gateway accepts from its upstream client, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// One capability (MCP tool) an endpoint exposes.
///
/// Transient: produced by a discovery exchange and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<CapabilityDescriptor>,
}

// ─── Endpoint Descriptors ────────────────────────────────────────────────────

/// Immutable launch record for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Variables that must be present in the gateway's environment.
    pub required_env: BTreeSet<String>,
    /// Fixed variables overlaid onto this endpoint's environment.
    pub env: BTreeMap<String, String>,
    pub description: String,
}

impl EndpointDescriptor {
    /// Descriptor with no environment requirements.
    pub fn new(name: &str, command: &str, args: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            required_env: BTreeSet::new(),
            env: BTreeMap::new(),
            description: description.to_string(),
        }
    }

    /// Add a required environment variable.
    pub fn require_env(mut self, name: &str) -> Self {
        self.required_env.insert(name.to_string());
        self
    }
}

/// `(name, description)` pair shown by the listing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    pub name: String,
    pub description: String,
}

// ─── Standard JSON-RPC Error Codes ───────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["method"], "notifications/initialized");
    }

    #[test]
    fn test_classify_response() {
        let value = serde_json::json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": []}});
        match IncomingMessage::classify(value) {
            Some(IncomingMessage::Response(resp)) => {
                assert_eq!(resp.id.as_u64(), Some(2));
                assert!(resp.result.is_some());
                assert!(resp.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let value = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        });
        match IncomingMessage::classify(value) {
            Some(IncomingMessage::Response(resp)) => {
                assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_server_request_and_notification() {
        let req = serde_json::json!({"jsonrpc": "2.0", "id": "s1", "method": "roots/list"});
        assert!(matches!(
            IncomingMessage::classify(req),
            Some(IncomingMessage::Request { method, .. }) if method == "roots/list"
        ));

        let note = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/message"});
        assert!(matches!(
            IncomingMessage::classify(note),
            Some(IncomingMessage::Notification { .. })
        ));
    }

    #[test]
    fn test_classify_rejects_non_messages() {
        assert!(IncomingMessage::classify(serde_json::json!("log line")).is_none());
        assert!(IncomingMessage::classify(serde_json::json!({"level": "info"})).is_none());
    }

    #[test]
    fn test_capability_descriptor_from_mcp_tool() {
        let json = r#"{"name": "ping", "description": "Reply with pong",
                       "inputSchema": {"type": "object"}}"#;
        let cap: CapabilityDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(cap.name, "ping");
        assert_eq!(cap.input_schema["type"], "object");
    }

    #[test]
    fn test_initialize_result_requires_protocol_version() {
        let ok = serde_json::json!({"protocolVersion": "2024-11-05", "capabilities": {}});
        assert!(serde_json::from_value::<InitializeResult>(ok).is_ok());

        let bad = serde_json::json!({"capabilities": {}});
        assert!(serde_json::from_value::<InitializeResult>(bad).is_err());
    }
}
