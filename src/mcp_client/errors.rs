//! Gateway error types.
//!
//! `GatewayError` is the per-call taxonomy surfaced to the upstream caller;
//! none of its variants is fatal to the gateway process. `ConfigError` is the
//! startup taxonomy: any of its variants stops the gateway before it serves
//! its first request.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while serving one discovery or invocation call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The endpoint name is not in the registry.
    #[error("unknown MCP server: '{name}' (available: {})", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<String>,
    },

    /// Required environment variables are not set for the endpoint.
    #[error("cannot use '{endpoint}': missing required environment variables: {}", names.join(", "))]
    MissingVariables {
        endpoint: String,
        names: Vec<String>,
    },

    /// The endpoint process could not be started.
    #[error("failed to spawn server '{endpoint}': {reason}")]
    SpawnError {
        endpoint: String,
        reason: String,
    },

    /// The initialization handshake did not complete in time.
    #[error("server '{endpoint}' did not complete initialization within {}s", timeout.as_secs_f64())]
    HandshakeTimeout {
        endpoint: String,
        timeout: Duration,
    },

    /// The discovery or invocation exchange did not complete in time.
    #[error("server '{endpoint}' did not respond within {}s", timeout.as_secs_f64())]
    OperationTimeout {
        endpoint: String,
        timeout: Duration,
    },

    /// Malformed or unexpected traffic, or the endpoint went away mid-exchange.
    #[error("protocol error from server '{endpoint}': {reason}")]
    ProtocolError {
        endpoint: String,
        reason: String,
    },

    /// The endpoint answered with a JSON-RPC error object.
    #[error("server '{endpoint}' returned error [{code}]: {message}")]
    EndpointError {
        endpoint: String,
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
}

impl GatewayError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NotFound { .. } => "not_found",
            GatewayError::MissingVariables { .. } => "missing_variables",
            GatewayError::SpawnError { .. } => "spawn_error",
            GatewayError::HandshakeTimeout { .. } => "handshake_timeout",
            GatewayError::OperationTimeout { .. } => "operation_timeout",
            GatewayError::ProtocolError { .. } => "protocol_error",
            GatewayError::EndpointError { .. } => "endpoint_error",
        }
    }

    /// Structured form of the error for the upstream `structuredContent`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            GatewayError::NotFound { available, .. } => {
                value["available"] = serde_json::json!(available);
            }
            GatewayError::MissingVariables { names, .. } => {
                value["missing"] = serde_json::json!(names);
            }
            GatewayError::HandshakeTimeout { timeout, .. }
            | GatewayError::OperationTimeout { timeout, .. } => {
                value["timeout_ms"] = serde_json::json!(timeout.as_millis() as u64);
            }
            GatewayError::EndpointError { code, data, .. } => {
                value["code"] = serde_json::json!(code);
                if let Some(data) = data {
                    value["data"] = data.clone();
                }
            }
            GatewayError::SpawnError { .. } | GatewayError::ProtocolError { .. } => {}
        }
        value
    }
}

/// Startup-time configuration and registry validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read {path}: {reason}")]
    Read {
        path: String,
        reason: String,
    },

    /// The config file could not be parsed.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        path: String,
        reason: String,
    },

    /// Two endpoints share a name.
    #[error("duplicate MCP server name: '{name}'")]
    DuplicateName {
        name: String,
    },

    /// An endpoint has no launch command.
    #[error("MCP server '{name}' has an empty launch command")]
    EmptyCommand {
        name: String,
    },

    /// An endpoint has an empty name.
    #[error("MCP server names must not be empty")]
    EmptyName,

    /// A timeout value is not a positive number of seconds.
    #[error("invalid value for {key}: '{value}' (expected a positive number of seconds)")]
    InvalidTimeout {
        key: String,
        value: String,
    },
}

// ─── Tests ───────────────────────────────────────────────────────────────────
